//! Marker id <-> page address mapping.
//!
//! The id space is split into one block per document. Each block holds one
//! sub-block per page, and each sub-block holds `corners_per_page` slots in
//! [`Corner::ALL`] order. Only the last slot (the designated corner) is ever
//! printed; the other three corners of every page carry the shared fixed ids
//! from [`MarkerConfig::fixed_marker_ids`].

use std::ops::RangeInclusive;

use crate::config::{ConfigError, MarkerConfig};

/// Page corner. Ordering matches the slot order inside a page sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    /// All corners in slot order.
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    /// Corner that carries the page-unique id.
    pub const DESIGNATED: Corner = Corner::BottomRight;

    /// Slot index inside a page sub-block.
    pub fn index(self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomLeft => 2,
            Corner::BottomRight => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Corner::TopLeft => "top_left",
            Corner::TopRight => "top_right",
            Corner::BottomLeft => "bottom_left",
            Corner::BottomRight => "bottom_right",
        }
    }
}

impl std::fmt::Display for Corner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded location of a marker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DocumentAddress {
    pub document_id: usize,
    pub page_number: usize,
    pub corner: Corner,
}

/// Address or id outside the configured capacity.
///
/// Always a caller or configuration bug; never worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutOfRange {
    #[error("document id {document_id} out of range: dictionary supports {max_documents} documents")]
    Document {
        document_id: usize,
        max_documents: usize,
    },
    #[error("page number {page_number} out of range: documents have {pages_per_document} pages")]
    Page {
        page_number: usize,
        pages_per_document: usize,
    },
    #[error("marker id {marker_id} exceeds dictionary capacity {max_marker_id}")]
    MarkerId {
        marker_id: usize,
        max_marker_id: usize,
    },
}

/// Bidirectional marker id codec for one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressCodec {
    max_marker_id: usize,
    pages_per_document: usize,
    corners_per_page: usize,
    fixed_marker_ids: [usize; 3],
}

impl AddressCodec {
    /// Build a codec, rejecting configs that fail [`MarkerConfig::validate`].
    pub fn new(config: &MarkerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            max_marker_id: config.max_marker_id,
            pages_per_document: config.pages_per_document,
            corners_per_page: config.corners_per_page,
            fixed_marker_ids: config.fixed_marker_ids,
        })
    }

    pub fn block_size(&self) -> usize {
        self.pages_per_document * self.corners_per_page
    }

    pub fn max_documents(&self) -> usize {
        (self.max_marker_id + 1) / self.block_size()
    }

    pub fn max_marker_id(&self) -> usize {
        self.max_marker_id
    }

    pub fn fixed_marker_ids(&self) -> [usize; 3] {
        self.fixed_marker_ids
    }

    /// Marker id printed at `address`.
    ///
    /// Non-designated corners return the shared fixed id for that corner;
    /// the page-unique id only exists for [`Corner::DESIGNATED`].
    pub fn encode(&self, address: DocumentAddress) -> Result<usize, OutOfRange> {
        let unique = self.encode_designated(address.document_id, address.page_number)?;
        if address.corner == Corner::DESIGNATED {
            Ok(unique)
        } else {
            Ok(self.fixed_marker_ids[address.corner.index()])
        }
    }

    /// Page-unique id for `(document_id, page_number)`.
    pub fn encode_designated(
        &self,
        document_id: usize,
        page_number: usize,
    ) -> Result<usize, OutOfRange> {
        self.check_page(document_id, page_number)?;

        let id = document_id * self.block_size()
            + page_number * self.corners_per_page
            + (self.corners_per_page - 1);
        if id > self.max_marker_id {
            return Err(OutOfRange::MarkerId {
                marker_id: id,
                max_marker_id: self.max_marker_id,
            });
        }
        Ok(id)
    }

    /// Slot address of `marker_id`. Exact left-inverse of [`encode_designated`](Self::encode_designated).
    pub fn decode(&self, marker_id: usize) -> Result<DocumentAddress, OutOfRange> {
        if marker_id > self.max_marker_id {
            return Err(OutOfRange::MarkerId {
                marker_id,
                max_marker_id: self.max_marker_id,
            });
        }

        let block = self.block_size();
        let remainder = marker_id % block;
        let slot = remainder % self.corners_per_page;
        // corners_per_page is validated to equal Corner::ALL.len()
        let corner = Corner::from_index(slot).unwrap_or(Corner::DESIGNATED);
        Ok(DocumentAddress {
            document_id: marker_id / block,
            page_number: remainder / self.corners_per_page,
            corner,
        })
    }

    /// Corner assigned to a shared fixed id, if `marker_id` is one.
    pub fn fixed_corner(&self, marker_id: usize) -> Option<Corner> {
        self.fixed_marker_ids
            .iter()
            .position(|&id| id == marker_id)
            .and_then(Corner::from_index)
    }

    pub fn is_fixed(&self, marker_id: usize) -> bool {
        self.fixed_marker_ids.contains(&marker_id)
    }

    /// Four ids for a page, ordered `[fixed, fixed, fixed, designated]`.
    pub fn page_marker_ids(
        &self,
        document_id: usize,
        page_number: usize,
    ) -> Result<[usize; 4], OutOfRange> {
        let unique = self.encode_designated(document_id, page_number)?;
        let [a, b, c] = self.fixed_marker_ids;
        Ok([a, b, c, unique])
    }

    /// First and last id of the block reserved for `document_id`.
    pub fn document_marker_range(
        &self,
        document_id: usize,
    ) -> Result<RangeInclusive<usize>, OutOfRange> {
        if document_id >= self.max_documents() {
            return Err(OutOfRange::Document {
                document_id,
                max_documents: self.max_documents(),
            });
        }
        let first = document_id * self.block_size();
        Ok(first..=first + self.block_size() - 1)
    }

    fn check_page(&self, document_id: usize, page_number: usize) -> Result<(), OutOfRange> {
        if page_number >= self.pages_per_document {
            return Err(OutOfRange::Page {
                page_number,
                pages_per_document: self.pages_per_document,
            });
        }
        if document_id >= self.max_documents() {
            return Err(OutOfRange::Document {
                document_id,
                max_documents: self.max_documents(),
            });
        }
        Ok(())
    }
}
