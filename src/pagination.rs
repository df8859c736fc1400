/// Cursor pagination over keyed listings
///
/// A cursor names the boundary row of a page by its ordering key and id, plus
/// the direction to walk from it. It is handed to clients as an opaque
/// URL-safe base64 token.
use crate::error::{AppError, AppResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

/// Fixed page size for appointment listings
pub const PAGE_SIZE: usize = 5;

/// Decoded position in an ordered listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Ordering key of the boundary row
    #[serde(rename = "k")]
    pub key: String,
    /// Row id, tie-breaker within equal keys
    #[serde(rename = "i")]
    pub id: i64,
    /// Walk backwards from the boundary row
    #[serde(rename = "r", default)]
    pub reverse: bool,
}

impl Cursor {
    pub fn new(key: impl Into<String>, id: i64, reverse: bool) -> Self {
        Self {
            key: key.into(),
            id,
            reverse,
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a plain struct of strings and integers cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> AppResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim_end_matches('='))
            .map_err(|_| invalid_cursor())?;
        serde_json::from_slice(&bytes).map_err(|_| invalid_cursor())
    }
}

pub fn invalid_cursor() -> AppError {
    AppError::Validation("Invalid cursor".to_string())
}

/// Query string of paginated endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
}

impl PageQuery {
    pub fn cursor(&self) -> AppResult<Option<Cursor>> {
        match self.cursor.as_deref() {
            None | Some("") => Ok(None),
            Some(token) => Cursor::decode(token).map(Some),
        }
    }
}

/// One page of results with links to its neighbours
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Build a page from rows fetched in walk order, at most `PAGE_SIZE + 1` of them
///
/// `key` yields the ordering key and id of a row.
pub fn paginate<T, F>(mut rows: Vec<T>, cursor: Option<&Cursor>, key: F) -> Page<T>
where
    F: Fn(&T) -> (String, i64),
{
    let reverse = cursor.is_some_and(|c| c.reverse);
    let has_more = rows.len() > PAGE_SIZE;
    rows.truncate(PAGE_SIZE);
    if reverse {
        rows.reverse();
    }

    let link = |row: Option<&T>, reverse: bool| {
        row.map(|r| {
            let (k, id) = key(r);
            Cursor::new(k, id, reverse).encode()
        })
    };

    let next = if !reverse && !has_more {
        None
    } else {
        link(rows.last(), false)
    };
    let previous = if (reverse && !has_more) || (!reverse && cursor.is_none()) {
        None
    } else {
        link(rows.first(), true)
    };

    Page {
        next,
        previous,
        results: rows,
    }
}
