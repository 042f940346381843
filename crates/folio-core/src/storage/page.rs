use uuid::Uuid;

use crate::{Error, Result};

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::MalformedId(raw.to_string()))
}

/// One cursor page of rows keyed by a text id.
///
/// The cursor always advances from the raw id, so a row whose id does not
/// parse is reported in `malformed` instead of stalling or ending the walk.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Raw ids of rows that could not be converted
    pub malformed: Vec<String>,
    /// Raw id of the last row, the `after` cursor for the next page
    pub last: Option<String>,
    /// Rows the query returned, converted or not
    pub rows: usize,
}

impl<T> Page<T> {
    pub(crate) fn from_rows<R>(
        rows: Vec<R>,
        raw_id: impl Fn(&R) -> &str,
        convert: impl Fn(R) -> Result<T>,
    ) -> Self {
        let mut page = Page {
            items: Vec::with_capacity(rows.len()),
            malformed: Vec::new(),
            last: None,
            rows: rows.len(),
        };

        for row in rows {
            let raw = raw_id(&row).to_string();
            match convert(row) {
                Ok(item) => page.items.push(item),
                Err(_) => page.malformed.push(raw.clone()),
            }
            page.last = Some(raw);
        }

        page
    }

    /// True when the query returned fewer rows than asked for
    pub fn is_final(&self, limit: u32) -> bool {
        self.rows < limit as usize
    }
}
