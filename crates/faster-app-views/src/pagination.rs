//! Page-number pagination for list endpoints.

use faster_app_core::settings::PaginationSettings;
use faster_app_core::{AppError, AppResult, ValidationError};
use faster_app_db::QuerySet;
use faster_app_http::QueryDict;
use serde::Serialize;
use serde_json::Value;

/// Query parameter carrying the 1-based page number.
pub const PAGE_PARAM: &str = "page";
/// Query parameter carrying the page size.
pub const SIZE_PARAM: &str = "size";

/// Validated `page` and `size` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: usize,
    pub size: usize,
}

impl PageParams {
    /// Reads `page` and `size` from the query string.
    ///
    /// Missing values take their defaults; anything that is not a positive
    /// integer, or a size above `max_size`, is a validation error.
    pub fn from_query(query: &QueryDict, limits: &PaginationSettings) -> AppResult<Self> {
        let page = parse_positive(query.get_trimmed(PAGE_PARAM), PAGE_PARAM, 1)?;
        let size = parse_positive(query.get_trimmed(SIZE_PARAM), SIZE_PARAM, limits.default_size)?;
        if size > limits.max_size {
            return Err(invalid(
                SIZE_PARAM,
                format!("Ensure this value is less than or equal to {}.", limits.max_size),
                "max_value",
            ));
        }
        if (page - 1).checked_mul(size).is_none() {
            return Err(invalid(PAGE_PARAM, "Page number is out of range.", "out_of_range"));
        }
        Ok(Self { page, size })
    }

    /// Number of rows skipped before this page.
    pub const fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }
}

fn parse_positive(raw: Option<&str>, param: &str, default: usize) -> AppResult<usize> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        Ok(_) => Err(invalid(param, "Ensure this value is greater than or equal to 1.", "min_value")),
        Err(_) => Err(invalid(param, "A valid integer is required.", "invalid")),
    }
}

fn invalid(param: &str, message: impl Into<String>, code: &str) -> AppError {
    AppError::ValidationFailed(
        ValidationError::new("Invalid pagination parameters", "invalid")
            .with_field_error(param, ValidationError::new(message, code)),
    )
}

/// One page of a list response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<Value>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
    pub pages: usize,
}

impl Page {
    /// Counts the queryset, then fetches the requested slice.
    ///
    /// Each record is turned into JSON by `render`. A page past the end is
    /// empty, not an error.
    pub async fn build<F, Fut>(queryset: QuerySet, params: PageParams, render: F) -> AppResult<Self>
    where
        F: Fn(faster_app_db::Record) -> Fut,
        Fut: std::future::Future<Output = AppResult<Value>>,
    {
        let total = queryset.count().await?;
        let records = queryset.slice(params.offset(), params.size).fetch().await?;
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            items.push(render(record).await?);
        }
        Ok(Self {
            items,
            total,
            page: params.page,
            size: params.size,
            pages: total.div_ceil(params.size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faster_app_db::{Collection, CollectionExt, MemoryCollection};
    use serde_json::json;
    use std::sync::Arc;

    fn params(qs: &str) -> AppResult<PageParams> {
        PageParams::from_query(&QueryDict::parse(qs), &PaginationSettings::default())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(params("").unwrap(), PageParams { page: 1, size: 20 });
        assert_eq!(params("page=3&size=5").unwrap().offset(), 10);
        assert_eq!(params("size=").unwrap().size, 20);
    }

    #[test]
    fn test_rejects_bad_values() {
        for qs in ["page=0", "page=-1", "page=abc", "size=0", "size=101", "size=1.5"] {
            let err = params(qs).unwrap_err();
            assert_eq!(err.status_code(), 400, "{qs}");
            assert!(matches!(err, AppError::ValidationFailed(_)));
        }
        assert_eq!(params("size=100").unwrap().size, 100);
    }

    #[test]
    fn test_rejects_page_past_addressable_range() {
        let err = params(&format!("page={}&size=20", usize::MAX)).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
        assert_eq!(err.status_code(), 400);

        let huge = PageParams { page: usize::MAX, size: 20 };
        assert_eq!(huge.offset(), usize::MAX);
    }

    #[tokio::test]
    async fn test_build_page() {
        let notes = MemoryCollection::new("notes");
        for n in 0..7 {
            let mut fields = faster_app_db::Fields::new();
            fields.insert("n".into(), json!(n));
            notes.create(fields).await.unwrap();
        }
        let notes: Arc<dyn Collection> = Arc::new(notes);
        let page = Page::build(notes.all(), PageParams { page: 2, size: 3 }, |r| async move {
            Ok(r.get("n").cloned().unwrap_or(Value::Null))
        })
        .await
        .unwrap();
        assert_eq!(page.items, vec![json!(3), json!(4), json!(5)]);
        assert_eq!((page.total, page.pages), (7, 3));

        let past = Page::build(notes.all(), PageParams { page: 9, size: 3 }, |r| async move {
            Ok(r.to_json())
        })
        .await
        .unwrap();
        assert!(past.items.is_empty());
        assert_eq!(past.total, 7);
    }
}
