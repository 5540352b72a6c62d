//! Representations: the shapes records take at the API boundary.
//!
//! A ViewSet names one read representation (what responses carry) and one
//! representation each for create and update bodies. Both traits have serde
//! based defaults, so a plain `#[derive(Serialize, Deserialize)]` struct is
//! usually all that is needed.

use async_trait::async_trait;
use faster_app_core::{AppError, AppResult};
use faster_app_db::{Fields, Record};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Converts a stored record into a response payload.
#[async_trait]
pub trait ReadRepresentation: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Builds the representation from a record.
    async fn from_instance(instance: &Record) -> AppResult<Self> {
        serde_json::from_value(instance.to_json()).map_err(|e| {
            AppError::internal("Failed to serialize record").with_detail(e.to_string())
        })
    }

    /// Builds the representation and renders it as JSON.
    async fn render(instance: &Record) -> AppResult<Value> {
        let repr = Self::from_instance(instance).await?;
        serde_json::to_value(repr).map_err(|e| {
            AppError::internal("Failed to serialize record").with_detail(e.to_string())
        })
    }
}

/// Extracts storable fields from a request body.
pub trait WriteRepresentation: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the fields to write.
    ///
    /// With `exclude_unset`, fields that serialize to `null` are left out so
    /// a partial update only touches what the client sent.
    fn to_fields(&self, exclude_unset: bool) -> AppResult<Fields> {
        let value = serde_json::to_value(self)
            .map_err(|e| AppError::bad_request("Invalid request body").with_detail(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(AppError::bad_request("Request body must be a JSON object"));
        };
        if exclude_unset {
            fields.retain(|_, v| !v.is_null());
        }
        Ok(fields)
    }

    /// Business validation run after deserialization.
    fn validate(&self) -> AppResult<()> {
        Ok(())
    }
}

/// A passthrough representation over the raw JSON object.
///
/// Every key the client sends counts as set, including explicit nulls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonRecord(pub Fields);

impl JsonRecord {
    /// Reads a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

#[async_trait]
impl ReadRepresentation for JsonRecord {
    async fn from_instance(instance: &Record) -> AppResult<Self> {
        Ok(Self(instance.clone().into_fields()))
    }
}

impl WriteRepresentation for JsonRecord {
    fn to_fields(&self, _exclude_unset: bool) -> AppResult<Fields> {
        Ok(self.0.clone())
    }
}
