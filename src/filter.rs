//! Multi-criteria vehicle filter shared by the public inventory page and the
//! admin inventory manager.
//!
//! All clauses are conjunctive and an unset facet contributes no constraint.
//! `filter` is pure: it never mutates its input and preserves input order.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;
use crate::models::{Vehicle, VehicleStatus};

#[derive(Debug, Error, PartialEq)]
#[error("invalid filter: {0}")]
pub struct InvalidCriteria(String);

impl From<InvalidCriteria> for AppError {
    fn from(e: InvalidCriteria) -> Self {
        AppError::Validation(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(VehicleStatus),
}

// Half-open numeric range [min, max)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    min: Option<i64>,
    max: Option<i64>,
}

impl Range {
    const fn new(min: Option<i64>, max: Option<i64>) -> Self {
        Self { min, max }
    }

    // Missing and negative values are malformed and never fall in a bucket
    fn contains(&self, value: Option<i64>) -> bool {
        value.is_some_and(|value| {
            value >= 0
                && self.min.is_none_or(|min| value >= min)
                && self.max.is_none_or(|max| value < max)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceBracket {
    Under100k,
    From100kTo200k,
    From200kTo300k,
    Over300k,
}

impl PriceBracket {
    pub const ALL: [PriceBracket; 4] = [
        PriceBracket::Under100k,
        PriceBracket::From100kTo200k,
        PriceBracket::From200kTo300k,
        PriceBracket::Over300k,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PriceBracket::Under100k => "Under 100k",
            PriceBracket::From100kTo200k => "100k - 200k",
            PriceBracket::From200kTo300k => "200k - 300k",
            PriceBracket::Over300k => "300k+",
        }
    }

    fn range(&self) -> Range {
        match self {
            PriceBracket::Under100k => Range::new(None, Some(100_000)),
            PriceBracket::From100kTo200k => Range::new(Some(100_000), Some(200_000)),
            PriceBracket::From200kTo300k => Range::new(Some(200_000), Some(300_000)),
            PriceBracket::Over300k => Range::new(Some(300_000), None),
        }
    }

    pub fn contains(&self, price: Option<i64>) -> bool {
        self.range().contains(price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MileageBracket {
    Under5k,
    From5kTo15k,
    From15kTo30k,
    Over30k,
}

impl MileageBracket {
    pub const ALL: [MileageBracket; 4] = [
        MileageBracket::Under5k,
        MileageBracket::From5kTo15k,
        MileageBracket::From15kTo30k,
        MileageBracket::Over30k,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MileageBracket::Under5k => "Under 5k",
            MileageBracket::From5kTo15k => "5k - 15k",
            MileageBracket::From15kTo30k => "15k - 30k",
            MileageBracket::Over30k => "30k+",
        }
    }

    fn range(&self) -> Range {
        match self {
            MileageBracket::Under5k => Range::new(None, Some(5_000)),
            MileageBracket::From5kTo15k => Range::new(Some(5_000), Some(15_000)),
            MileageBracket::From15kTo30k => Range::new(Some(15_000), Some(30_000)),
            MileageBracket::Over30k => Range::new(Some(30_000), None),
        }
    }

    pub fn contains(&self, mileage: Option<i64>) -> bool {
        self.range().contains(mileage)
    }
}

/// The full set of user-specified facets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub search: String,
    pub status: StatusFilter,
    pub make: Option<String>,
    pub year: Option<String>,
    pub price: Option<PriceBracket>,
    pub mileage: Option<MileageBracket>,
}

/// Raw form/query values as sent by the front-end controls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CriteriaQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub make: Option<String>,
    pub year: Option<String>,
    pub price: Option<String>,
    pub mileage: Option<String>,
}

// Placeholder values the select controls send when nothing is chosen
fn is_unset(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value.is_empty()
        || value == "all"
        || value == "any"
        || value.starts_with("all ")
        || value.starts_with("any ")
}

fn set_value(value: Option<String>) -> Option<String> {
    value.filter(|v| !is_unset(v)).map(|v| v.trim().to_string())
}

// "Under 5k", "under 5K" and "under5k" are the same bucket
fn normalize_label(label: &str) -> String {
    label.to_lowercase().split_whitespace().collect()
}

fn parse_bracket<B: Copy>(
    value: Option<String>,
    all: &[B],
    label: fn(&B) -> &'static str,
    facet: &str,
) -> Result<Option<B>, InvalidCriteria> {
    let Some(value) = set_value(value) else {
        return Ok(None);
    };
    let wanted = normalize_label(&value);
    all.iter()
        .find(|b| normalize_label(label(b)) == wanted)
        .copied()
        .map(Some)
        .ok_or_else(|| InvalidCriteria(format!("unknown {} bracket '{}'", facet, value)))
}

impl TryFrom<CriteriaQuery> for Criteria {
    type Error = InvalidCriteria;

    fn try_from(query: CriteriaQuery) -> Result<Self, Self::Error> {
        let status = match set_value(query.status) {
            None => StatusFilter::All,
            Some(s) => StatusFilter::Only(s.parse().map_err(InvalidCriteria)?),
        };

        Ok(Criteria {
            search: query.search.map(|s| s.trim().to_string()).unwrap_or_default(),
            status,
            make: set_value(query.make),
            year: set_value(query.year),
            price: parse_bracket(query.price, &PriceBracket::ALL, PriceBracket::label, "price")?,
            mileage: parse_bracket(
                query.mileage,
                &MileageBracket::ALL,
                MileageBracket::label,
                "mileage",
            )?,
        })
    }
}

// Criteria with the lower-casing done once per filter call
struct Prepared<'a> {
    term: String,
    make: Option<String>,
    criteria: &'a Criteria,
}

impl<'a> Prepared<'a> {
    fn new(criteria: &'a Criteria) -> Self {
        Self {
            term: criteria.search.trim().to_lowercase(),
            make: criteria.make.as_ref().map(|m| m.trim().to_lowercase()),
            criteria,
        }
    }

    fn search_matches(&self, vehicle: &Vehicle) -> bool {
        if self.term.is_empty() {
            return true;
        }
        let term = self.term.as_str();
        vehicle.make.to_lowercase().contains(term)
            || vehicle.model.to_lowercase().contains(term)
            || vehicle.year.is_some_and(|year| year.to_string().contains(term))
            || vehicle.tags.iter().any(|tag| tag.to_lowercase().contains(term))
    }

    fn matches(&self, vehicle: &Vehicle) -> bool {
        let c = self.criteria;

        let status_ok = match c.status {
            StatusFilter::All => true,
            StatusFilter::Only(status) => vehicle.status == status,
        };
        let make_ok = self
            .make
            .as_ref()
            .is_none_or(|make| vehicle.make.trim().to_lowercase() == *make);
        let year_ok = c
            .year
            .as_ref()
            .is_none_or(|year| vehicle.year.is_some_and(|y| y.to_string() == *year));
        let price_ok = c.price.is_none_or(|b| b.contains(vehicle.price));
        let mileage_ok = c.mileage.is_none_or(|b| b.contains(vehicle.mileage));

        // Cheap clauses first, the text search allocates
        status_ok && make_ok && year_ok && price_ok && mileage_ok && self.search_matches(vehicle)
    }
}

impl Criteria {
    pub fn search(term: impl Into<String>) -> Self {
        Criteria {
            search: term.into(),
            ..Default::default()
        }
    }

    pub fn status(status: VehicleStatus) -> Self {
        Criteria {
            status: StatusFilter::Only(status),
            ..Default::default()
        }
    }

    pub fn is_unset(&self) -> bool {
        self.search.trim().is_empty()
            && self.status == StatusFilter::All
            && self.make.is_none()
            && self.year.is_none()
            && self.price.is_none()
            && self.mileage.is_none()
    }

    pub fn matches(&self, vehicle: &Vehicle) -> bool {
        Prepared::new(self).matches(vehicle)
    }
}

/// Returns the vehicles satisfying every active clause, in input order.
pub fn filter(vehicles: &[Vehicle], criteria: &Criteria) -> Vec<Vehicle> {
    let prepared = Prepared::new(criteria);
    vehicles
        .iter()
        .filter(|v| prepared.matches(v))
        .cloned()
        .collect()
}

/// Option lists for the public page's select controls.
#[derive(Debug, Clone, Serialize)]
pub struct Facets {
    pub makes: Vec<String>,
    pub years: Vec<i32>,
    pub price_brackets: Vec<&'static str>,
    pub mileage_brackets: Vec<&'static str>,
}

impl Facets {
    pub fn from_vehicles(vehicles: &[Vehicle]) -> Self {
        let mut seen = HashSet::new();
        let mut makes: Vec<String> = vehicles
            .iter()
            .map(|v| v.make.trim().to_string())
            .filter(|m| !m.is_empty() && seen.insert(m.to_lowercase()))
            .collect();
        makes.sort_by_key(|m| m.to_lowercase());

        let years: BTreeSet<i32> = vehicles.iter().filter_map(|v| v.year).collect();

        Facets {
            makes,
            years: years.into_iter().rev().collect(),
            price_brackets: PriceBracket::ALL.iter().map(|b| b.label()).collect(),
            mileage_brackets: MileageBracket::ALL.iter().map(|b| b.label()).collect(),
        }
    }
}
