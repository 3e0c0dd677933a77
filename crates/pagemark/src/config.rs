//! Runtime marker configuration.
//!
//! Config JSON follows a flat schema (`pagemark.config.v1`). Capacity values
//! such as the block size and the number of addressable documents are derived
//! at runtime and are not part of the schema.

use std::path::Path;

use crate::codec::Corner;

const CONFIG_SCHEMA_V1: &str = "pagemark.config.v1";

const DEFAULT_NAME: &str = "exam_a4_200dpi_7x7";
const DEFAULT_MAX_MARKER_ID: usize = 999;
const DEFAULT_PAGES_PER_DOCUMENT: usize = 9;
const DEFAULT_CORNERS_PER_PAGE: usize = 4;
const DEFAULT_FIXED_MARKER_IDS: [usize; 3] = [0, 1, 2];
const DEFAULT_MARKER_SIZE_PX: u32 = 90;
const DEFAULT_MARGIN_PX: u32 = 20;
const DEFAULT_DOCUMENT_WIDTH_PX: u32 = 1654;
const DEFAULT_DOCUMENT_HEIGHT_PX: u32 = 2338;

/// Errors raised while loading or validating a [`MarkerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Immutable marker configuration shared by every component.
///
/// All pixel quantities are expressed in the canonical document raster
/// (`document_width_px` x `document_height_px`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MarkerConfig {
    pub name: String,
    /// Largest id in the fiducial dictionary (dictionary holds `max_marker_id + 1` glyphs).
    pub max_marker_id: usize,
    pub pages_per_document: usize,
    pub corners_per_page: usize,
    /// Ids shared by every page, in `top_left, top_right, bottom_left` order.
    pub fixed_marker_ids: [usize; 3],
    /// Side length of a rendered marker glyph.
    pub marker_size_px: u32,
    /// Offset between the page edge and the nearest glyph edge.
    pub margin_px: u32,
    pub document_width_px: u32,
    pub document_height_px: u32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct MarkerConfigSpecV1 {
    schema: String,
    name: String,
    max_marker_id: usize,
    pages_per_document: usize,
    corners_per_page: usize,
    fixed_marker_ids: [usize; 3],
    marker_size_px: u32,
    margin_px: u32,
    document_width_px: u32,
    document_height_px: u32,
}

impl MarkerConfig {
    /// Number of consecutive ids reserved for one document.
    pub fn block_size(&self) -> usize {
        self.pages_per_document * self.corners_per_page
    }

    /// Number of documents the dictionary can address.
    pub fn max_documents(&self) -> usize {
        (self.max_marker_id + 1) / self.block_size()
    }

    /// Number of distinct glyphs in the fiducial dictionary.
    pub fn dictionary_size(&self) -> usize {
        self.max_marker_id + 1
    }

    /// Fixed id printed in `corner`, or `None` for the designated corner.
    pub fn fixed_marker_id(&self, corner: Corner) -> Option<usize> {
        self.fixed_marker_ids.get(corner.index()).copied()
    }

    /// Check every invariant the codec, placer and resolver rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_config(self).map_err(ConfigError::Invalid)
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Parse a config from JSON text.
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let spec: MarkerConfigSpecV1 = serde_json::from_str(data)?;
        Self::from_spec(spec)
    }

    /// Serialize to the versioned JSON schema.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        let spec = MarkerConfigSpecV1 {
            schema: CONFIG_SCHEMA_V1.to_string(),
            name: self.name.clone(),
            max_marker_id: self.max_marker_id,
            pages_per_document: self.pages_per_document,
            corners_per_page: self.corners_per_page,
            fixed_marker_ids: self.fixed_marker_ids,
            marker_size_px: self.marker_size_px,
            margin_px: self.margin_px,
            document_width_px: self.document_width_px,
            document_height_px: self.document_height_px,
        };
        Ok(serde_json::to_string_pretty(&spec)?)
    }

    fn from_spec(spec: MarkerConfigSpecV1) -> Result<Self, ConfigError> {
        if spec.schema != CONFIG_SCHEMA_V1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config schema '{}' (expected '{}')",
                spec.schema, CONFIG_SCHEMA_V1
            )));
        }

        let config = Self {
            name: spec.name,
            max_marker_id: spec.max_marker_id,
            pages_per_document: spec.pages_per_document,
            corners_per_page: spec.corners_per_page,
            fixed_marker_ids: spec.fixed_marker_ids,
            marker_size_px: spec.marker_size_px,
            margin_px: spec.margin_px,
            document_width_px: spec.document_width_px,
            document_height_px: spec.document_height_px,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            max_marker_id: DEFAULT_MAX_MARKER_ID,
            pages_per_document: DEFAULT_PAGES_PER_DOCUMENT,
            corners_per_page: DEFAULT_CORNERS_PER_PAGE,
            fixed_marker_ids: DEFAULT_FIXED_MARKER_IDS,
            marker_size_px: DEFAULT_MARKER_SIZE_PX,
            margin_px: DEFAULT_MARGIN_PX,
            document_width_px: DEFAULT_DOCUMENT_WIDTH_PX,
            document_height_px: DEFAULT_DOCUMENT_HEIGHT_PX,
        }
    }
}

fn validate_config(config: &MarkerConfig) -> Result<(), String> {
    if config.name.trim().is_empty() {
        return Err("config name must not be empty".to_string());
    }

    if config.corners_per_page != Corner::ALL.len() {
        return Err(format!(
            "corners_per_page must be {} (got {})",
            Corner::ALL.len(),
            config.corners_per_page
        ));
    }

    if config.pages_per_document == 0 {
        return Err("pages_per_document must be >= 1".to_string());
    }

    if config.block_size() > config.dictionary_size() {
        return Err(format!(
            "dictionary of {} ids cannot hold a single document block of {} ids",
            config.dictionary_size(),
            config.block_size()
        ));
    }

    let designated_slot = config.corners_per_page - 1;
    for (i, &id) in config.fixed_marker_ids.iter().enumerate() {
        if id > config.max_marker_id {
            return Err(format!(
                "fixed marker id {} exceeds dictionary capacity {}",
                id, config.max_marker_id
            ));
        }
        if id % config.corners_per_page == designated_slot {
            return Err(format!(
                "fixed marker id {} occupies a designated page slot",
                id
            ));
        }
        if config.fixed_marker_ids[..i].contains(&id) {
            return Err(format!("fixed marker id {} is listed twice", id));
        }
    }

    if config.marker_size_px == 0 {
        return Err("marker_size_px must be > 0".to_string());
    }

    let footprint = 2 * (u64::from(config.margin_px) + u64::from(config.marker_size_px));
    if footprint > u64::from(config.document_width_px)
        || footprint > u64::from(config.document_height_px)
    {
        return Err(format!(
            "document {}x{} px cannot hold two markers plus margins ({} px) per side",
            config.document_width_px, config.document_height_px, footprint
        ));
    }

    Ok(())
}
