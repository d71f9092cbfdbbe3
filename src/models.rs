// Data structures persisted in the remote store and exchanged with the front-end

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::autosave::Editable;
use crate::error::{AppError, AppResult};
use crate::store::{EntityKind, Record};

// --- Vehicles ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    #[default]
    Available,
    Sold,
    Reserved,
    Maintenance,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "available",
            VehicleStatus::Sold => "sold",
            VehicleStatus::Reserved => "reserved",
            VehicleStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Exact, case-sensitive match against the stored enum values
impl FromStr for VehicleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(VehicleStatus::Available),
            "sold" => Ok(VehicleStatus::Sold),
            "reserved" => Ok(VehicleStatus::Reserved),
            "maintenance" => Ok(VehicleStatus::Maintenance),
            other => Err(format!("unknown vehicle status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub make: String,
    pub model: String,
    // None when the stored value is missing or not a usable number;
    // such a vehicle is still listed but never matches a year or bracket
    #[serde(default, deserialize_with = "de::lenient_number")]
    pub year: Option<i32>,
    // Smallest currency unit
    #[serde(default, deserialize_with = "de::lenient_number")]
    pub price: Option<i64>,
    #[serde(default, deserialize_with = "de::lenient_number")]
    pub mileage: Option<i64>,
    #[serde(default)]
    pub status: VehicleStatus,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub images: Vec<String>,
    // Open mapping: horsepower, torque, acceleration, ...
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub specs: Map<String, Value>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub features: Vec<String>,
    // Insertion order is display order
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Vehicle {
    const KIND: EntityKind = EntityKind::Vehicles;

    fn id(&self) -> &str {
        &self.id
    }
}

// Admin form submission for a new vehicle
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleForm {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub price: i64,
    pub mileage: i64,
    #[serde(default)]
    pub status: VehicleStatus,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub specs: Map<String, Value>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    // Replace supplied tags with the derived ones
    #[serde(default)]
    pub auto_tag: bool,
}

impl VehicleForm {
    pub fn validate(&self, current_year: i32) -> AppResult<()> {
        if self.make.trim().is_empty() {
            return Err(AppError::validation("make is required"));
        }
        if self.model.trim().is_empty() {
            return Err(AppError::validation("model is required"));
        }
        validate_numbers(Some(self.year), Some(self.price), Some(self.mileage), current_year)
    }

    // Row fields sent to the store's create call
    pub fn into_fields(self, tags: Vec<String>) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("make".into(), Value::String(self.make.trim().to_string()));
        fields.insert("model".into(), Value::String(self.model.trim().to_string()));
        fields.insert("year".into(), self.year.into());
        fields.insert("price".into(), self.price.into());
        fields.insert("mileage".into(), self.mileage.into());
        fields.insert("status".into(), Value::String(self.status.as_str().to_string()));
        fields.insert("images".into(), string_array(self.images));
        fields.insert("specs".into(), Value::Object(self.specs));
        fields.insert("features".into(), string_array(dedupe(self.features)));
        fields.insert("tags".into(), string_array(tags));
        fields.insert(
            "description".into(),
            self.description.map(Value::String).unwrap_or(Value::Null),
        );
        fields
    }
}

// Partial admin edit; tags are only touched when given explicitly
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VehiclePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mileage: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VehicleStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specs: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VehiclePatch {
    pub fn validate(&self, current_year: i32) -> AppResult<()> {
        for (name, value) in [("make", &self.make), ("model", &self.model)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(AppError::validation(format!("{} cannot be blank", name)));
            }
        }
        validate_numbers(self.year, self.price, self.mileage, current_year)
    }

    pub fn is_empty(&self) -> bool {
        self.to_fields().is_empty()
    }

    pub fn to_fields(&self) -> Map<String, Value> {
        let mut patch = self.clone();
        patch.features = patch.features.map(dedupe);
        match serde_json::to_value(patch) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

fn validate_numbers(
    year: Option<i32>,
    price: Option<i64>,
    mileage: Option<i64>,
    current_year: i32,
) -> AppResult<()> {
    if let Some(year) = year {
        if !(1900..=current_year + 1).contains(&year) {
            return Err(AppError::validation(format!(
                "year must be between 1900 and {}",
                current_year + 1
            )));
        }
    }
    if price.is_some_and(|p| p < 0) {
        return Err(AppError::validation("price cannot be negative"));
    }
    if mileage.is_some_and(|m| m < 0) {
        return Err(AppError::validation("mileage cannot be negative"));
    }
    Ok(())
}

// Features behave as a set; keep first occurrence order
fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

fn string_array(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::String).collect())
}

// --- Content sections ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Hero,
    Services,
    Inventory,
    Testimonials,
    Contact,
    About,
    Finance,
    Trust,
    Promo,
    Map,
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionType::Hero => "hero",
            SectionType::Services => "services",
            SectionType::Inventory => "inventory",
            SectionType::Testimonials => "testimonials",
            SectionType::Contact => "contact",
            SectionType::About => "about",
            SectionType::Finance => "finance",
            SectionType::Trust => "trust",
            SectionType::Promo => "promo",
            SectionType::Map => "map",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subheading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Shared shape for the plain text-and-image blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent_color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apr_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_term_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Section content keyed by section type. Unknown keys survive in each
/// variant's `extra` map so newer front-ends can add fields without a migration.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionContent {
    Hero(HeroContent),
    Services(BlockContent),
    Inventory(BlockContent),
    Testimonials(BlockContent),
    Contact(ContactContent),
    About(BlockContent),
    Finance(FinanceContent),
    Trust(BlockContent),
    Promo(PromoContent),
    Map(MapContent),
}

impl SectionContent {
    pub fn from_parts(
        section_type: SectionType,
        content: Value,
    ) -> Result<Self, serde_json::Error> {
        let content = match content {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Ok(match section_type {
            SectionType::Hero => SectionContent::Hero(serde_json::from_value(content)?),
            SectionType::Services => SectionContent::Services(serde_json::from_value(content)?),
            SectionType::Inventory => SectionContent::Inventory(serde_json::from_value(content)?),
            SectionType::Testimonials => {
                SectionContent::Testimonials(serde_json::from_value(content)?)
            }
            SectionType::Contact => SectionContent::Contact(serde_json::from_value(content)?),
            SectionType::About => SectionContent::About(serde_json::from_value(content)?),
            SectionType::Finance => SectionContent::Finance(serde_json::from_value(content)?),
            SectionType::Trust => SectionContent::Trust(serde_json::from_value(content)?),
            SectionType::Promo => SectionContent::Promo(serde_json::from_value(content)?),
            SectionType::Map => SectionContent::Map(serde_json::from_value(content)?),
        })
    }

    pub fn section_type(&self) -> SectionType {
        match self {
            SectionContent::Hero(_) => SectionType::Hero,
            SectionContent::Services(_) => SectionType::Services,
            SectionContent::Inventory(_) => SectionType::Inventory,
            SectionContent::Testimonials(_) => SectionType::Testimonials,
            SectionContent::Contact(_) => SectionType::Contact,
            SectionContent::About(_) => SectionType::About,
            SectionContent::Finance(_) => SectionType::Finance,
            SectionContent::Trust(_) => SectionType::Trust,
            SectionContent::Promo(_) => SectionType::Promo,
            SectionContent::Map(_) => SectionType::Map,
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let value = match self {
            SectionContent::Hero(c) => serde_json::to_value(c),
            SectionContent::Services(c)
            | SectionContent::Inventory(c)
            | SectionContent::Testimonials(c)
            | SectionContent::About(c)
            | SectionContent::Trust(c) => serde_json::to_value(c),
            SectionContent::Contact(c) => serde_json::to_value(c),
            SectionContent::Finance(c) => serde_json::to_value(c),
            SectionContent::Promo(c) => serde_json::to_value(c),
            SectionContent::Map(c) => serde_json::to_value(c),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Shallow merge keyed by field name. `null` clears a field.
    pub fn merge_content(&mut self, patch: Map<String, Value>) -> Result<(), serde_json::Error> {
        let mut current = self.to_map();
        for (key, value) in patch {
            if value.is_null() {
                current.remove(&key);
            } else {
                current.insert(key, value);
            }
        }
        *self = Self::from_parts(self.section_type(), Value::Object(current))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SectionRow", into = "SectionRow")]
pub struct Section {
    pub id: String,
    pub title: String,
    pub visible: bool,
    // Unique ordering key, not necessarily contiguous
    pub sort_order: i64,
    pub content: SectionContent,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Section {
    pub fn section_type(&self) -> SectionType {
        self.content.section_type()
    }
}

// Flat storage shape of a section row
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectionRow {
    id: String,
    section_type: SectionType,
    #[serde(default)]
    title: String,
    #[serde(default)]
    visible: bool,
    #[serde(default, deserialize_with = "de::lenient_int")]
    sort_order: i64,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<SectionRow> for Section {
    type Error = serde_json::Error;

    fn try_from(row: SectionRow) -> Result<Self, Self::Error> {
        Ok(Section {
            content: SectionContent::from_parts(row.section_type, row.content)?,
            id: row.id,
            title: row.title,
            visible: row.visible,
            sort_order: row.sort_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<Section> for SectionRow {
    fn from(section: Section) -> Self {
        SectionRow {
            section_type: section.section_type(),
            content: Value::Object(section.content.to_map()),
            id: section.id,
            title: section.title,
            visible: section.visible,
            sort_order: section.sort_order,
            created_at: section.created_at,
            updated_at: section.updated_at,
        }
    }
}

impl Record for Section {
    const KIND: EntityKind = EntityKind::Sections;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Editable for Section {
    fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.visible == other.visible
            && self.sort_order == other.sort_order
            && self.content == other.content
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionForm {
    pub section_type: SectionType,
    pub title: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    // Appended after the last section when absent
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub content: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl SectionForm {
    pub fn validate(&self) -> AppResult<SectionContent> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("title is required"));
        }
        SectionContent::from_parts(self.section_type, Value::Object(self.content.clone()))
            .map_err(|e| {
                AppError::validation(format!("invalid {} content: {}", self.section_type, e))
            })
    }
}

// Edits applied through the autosave editor or the plain PATCH route
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionEdit {
    pub title: Option<String>,
    pub visible: Option<bool>,
    pub sort_order: Option<i64>,
    // Shallow-merged into the existing content
    pub content: Option<Map<String, Value>>,
}

impl SectionEdit {
    pub fn apply(self, section: &mut Section) -> Result<(), serde_json::Error> {
        if let Some(title) = self.title {
            section.title = title;
        }
        if let Some(visible) = self.visible {
            section.visible = visible;
        }
        if let Some(sort_order) = self.sort_order {
            section.sort_order = sort_order;
        }
        if let Some(content) = self.content {
            section.content.merge_content(content)?;
        }
        Ok(())
    }
}

// --- Site settings ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub id: String,
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub opening_hours: Option<String>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub social_links: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for SiteSettings {
    const KIND: EntityKind = EntityKind::Settings;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Editable for SiteSettings {
    fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.business_name == other.business_name
            && self.tagline == other.tagline
            && self.phone == other.phone
            && self.email == other.email
            && self.address == other.address
            && self.opening_hours == other.opening_hours
            && self.social_links == other.social_links
            && self.extra == other.extra
    }
}

impl SiteSettings {
    // Shallow merge of a settings edit; unknown keys land in `extra`
    pub fn merge(&mut self, patch: Map<String, Value>) -> Result<(), serde_json::Error> {
        let mut current = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            if matches!(key.as_str(), "id" | "created_at" | "updated_at") {
                continue;
            }
            current.insert(key, value);
        }
        *self = serde_json::from_value(Value::Object(current))?;
        Ok(())
    }
}

mod de {
    use super::*;

    // Integers, floats and numeric strings that fit an i64, truncated toward zero
    fn as_int(value: &Value) -> Option<i64> {
        let finite = |f: f64| {
            Some(f)
                .filter(|f| (i64::MIN as f64..i64::MAX as f64).contains(f))
                .map(|f| f.trunc() as i64)
        };
        match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(finite)),
            Value::String(s) => s.trim().parse::<f64>().ok().and_then(finite),
            _ => None,
        }
    }

    // Null decodes as the default; anything else unusable is an error
    pub fn lenient_int<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<i64> + Default,
    {
        use serde::de::Error;

        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(T::default());
        }
        let number = as_int(&value)
            .ok_or_else(|| D::Error::custom(format!("expected a number, got {}", value)))?;
        T::try_from(number).map_err(|_| D::Error::custom(format!("number {} out of range", number)))
    }

    // Never fails: null, junk and out-of-range values all become None
    pub fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<i64>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(as_int(&value).and_then(|n| T::try_from(n).ok()))
    }

    pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vehicle_decodes_lenient_numbers_and_null_collections() {
        let vehicle: Vehicle = serde_json::from_value(json!({
            "id": "v1",
            "make": "BMW",
            "model": "M3",
            "year": "2022",
            "price": 85000.0,
            "mileage": 1200,
            "status": "reserved",
            "images": null,
            "tags": ["NEW"]
        }))
        .unwrap();

        assert_eq!(vehicle.year, Some(2022));
        assert_eq!(vehicle.price, Some(85000));
        assert_eq!(vehicle.status, VehicleStatus::Reserved);
        assert!(vehicle.images.is_empty());
        assert_eq!(vehicle.tags, vec!["NEW"]);
    }

    #[test]
    fn vehicle_with_unusable_numbers_still_decodes() {
        let vehicle: Vehicle = serde_json::from_value(json!({
            "id": "v1", "make": "BMW", "model": "M3", "year": "n/a",
            "price": "call us", "mileage": null
        }))
        .unwrap();
        assert_eq!(vehicle.year, None);
        assert_eq!(vehicle.price, None);
        assert_eq!(vehicle.mileage, None);

        let vehicle: Vehicle = serde_json::from_value(json!({
            "id": "v2", "make": "Kia", "model": "Rio", "price": 1e300
        }))
        .unwrap();
        assert_eq!(vehicle.price, None);
        assert_eq!(vehicle.year, None);
    }

    #[test]
    fn status_parse_is_case_sensitive() {
        assert_eq!("sold".parse::<VehicleStatus>(), Ok(VehicleStatus::Sold));
        assert!("Sold".parse::<VehicleStatus>().is_err());
    }

    #[test]
    fn form_validation_rejects_missing_make_and_bad_year() {
        let mut form: VehicleForm = serde_json::from_value(json!({
            "make": " ", "model": "911", "year": 2023, "price": 1, "mileage": 0
        }))
        .unwrap();
        assert!(matches!(form.validate(2026), Err(AppError::Validation(_))));

        form.make = "Porsche".into();
        assert!(form.validate(2026).is_ok());

        form.year = 2030;
        assert!(matches!(form.validate(2026), Err(AppError::Validation(_))));
    }

    #[test]
    fn form_fields_dedupe_features() {
        let form: VehicleForm = serde_json::from_value(json!({
            "make": "Audi", "model": "A4", "year": 2020, "price": 1, "mileage": 0,
            "features": ["Sunroof", "sunroof", "Heated Seats"]
        }))
        .unwrap();
        let fields = form.into_fields(vec![]);
        assert_eq!(fields["features"], json!(["Sunroof", "Heated Seats"]));
        assert_eq!(fields["status"], json!("available"));
    }

    #[test]
    fn patch_only_serializes_present_fields() {
        let patch = VehiclePatch {
            price: Some(1000),
            ..Default::default()
        };
        let fields = patch.to_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["price"], json!(1000));
        assert!(VehiclePatch::default().is_empty());
    }

    #[test]
    fn section_row_round_trips_through_tagged_content() {
        let row = json!({
            "id": "s1",
            "section_type": "hero",
            "title": "Welcome",
            "visible": true,
            "sort_order": 10,
            "content": { "heading": "Drive", "imageUrl": "https://x/y.png", "ribbon": "new" }
        });
        let section: Section = serde_json::from_value(row).unwrap();
        match &section.content {
            SectionContent::Hero(hero) => {
                assert_eq!(hero.heading.as_deref(), Some("Drive"));
                assert_eq!(hero.image_url.as_deref(), Some("https://x/y.png"));
                assert_eq!(hero.extra["ribbon"], json!("new"));
            }
            other => panic!("expected hero content, got {:?}", other),
        }

        let back = serde_json::to_value(&section).unwrap();
        assert_eq!(back["section_type"], json!("hero"));
        assert_eq!(back["content"]["ribbon"], json!("new"));
        assert_eq!(back["content"]["imageUrl"], json!("https://x/y.png"));
    }

    #[test]
    fn content_merge_is_shallow_and_null_clears() {
        let mut content = SectionContent::from_parts(
            SectionType::Promo,
            json!({ "heading": "Sale", "code": "SPRING", "badge": { "x": 1 } }),
        )
        .unwrap();

        let patch = json!({ "code": null, "badge": { "y": 2 }, "description": "10% off" });
        content.merge_content(patch.as_object().unwrap().clone()).unwrap();

        let map = content.to_map();
        assert_eq!(map["heading"], json!("Sale"));
        assert!(!map.contains_key("code"));
        assert_eq!(map["badge"], json!({ "y": 2 }));
        assert_eq!(map["description"], json!("10% off"));
        assert_eq!(content.section_type(), SectionType::Promo);
    }

    #[test]
    fn same_content_ignores_timestamps() {
        let a: Section = serde_json::from_value(json!({
            "id": "s1", "section_type": "about", "title": "About", "visible": true,
            "sort_order": 1, "content": {}, "updated_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        let mut b = a.clone();
        b.updated_at = None;
        assert!(a.same_content(&b));
        b.title = "About us".into();
        assert!(!a.same_content(&b));
    }

    #[test]
    fn settings_merge_keeps_unknown_keys() {
        let mut settings: SiteSettings = serde_json::from_value(json!({
            "id": "main", "business_name": "Apex Motors", "theme": "dark"
        }))
        .unwrap();
        let patch = json!({ "phone": "555-0100", "id": "other" });
        settings.merge(patch.as_object().unwrap().clone()).unwrap();

        assert_eq!(settings.id, "main");
        assert_eq!(settings.phone.as_deref(), Some("555-0100"));
        assert_eq!(settings.extra["theme"], json!("dark"));
    }
}
