//! DataProvider trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProviderError, ProviderResult};
use crate::record::{Identifier, Record};

/// Maximum length of a resource name.
pub const MAX_RESOURCE_NAME_LENGTH: usize = 128;

/// Parameters for `get_many`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetManyParams {
    pub ids: Vec<Identifier>,
}

impl GetManyParams {
    pub fn new(ids: impl IntoIterator<Item = impl Into<Identifier>>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// Response of `get_many`.
///
/// Records may come back in any order; ids the backend does not know are
/// simply absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetManyResponse {
    pub data: Vec<Record>,
}

/// Parameters for `get_one`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOneParams {
    pub id: Identifier,
}

/// Response of `get_one`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetOneResponse {
    pub data: Record,
}

/// Parameters for `update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateParams {
    /// The record to update.
    pub id: Identifier,
    /// The fields to change.
    pub data: Map<String, Value>,
    /// The record as the caller last saw it, if known.
    pub previous_data: Option<Record>,
}

impl UpdateParams {
    pub fn new(id: impl Into<Identifier>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
            previous_data: None,
        }
    }

    pub fn with_previous_data(mut self, previous: Record) -> Self {
        self.previous_data = Some(previous);
        self
    }
}

/// Response of `update`: the authoritative record after the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub data: Record,
}

/// Abstract backend interface.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations. Failures are reported as [`ProviderError`] values and
/// are never retried by the callers in this workspace.
#[async_trait]
pub trait DataProvider: Send + Sync + 'static {
    /// Fetches the records with the given ids.
    async fn get_many(
        &self,
        resource: &str,
        params: &GetManyParams,
    ) -> ProviderResult<GetManyResponse>;

    /// Applies a partial update to one record.
    async fn update(&self, resource: &str, params: &UpdateParams)
        -> ProviderResult<UpdateResponse>;

    /// Fetches a single record.
    ///
    /// Default implementation goes through `get_many`.
    async fn get_one(&self, resource: &str, params: &GetOneParams) -> ProviderResult<GetOneResponse> {
        let response = self
            .get_many(
                resource,
                &GetManyParams {
                    ids: vec![params.id.clone()],
                },
            )
            .await?;
        response
            .data
            .into_iter()
            .find(|record| record.id == params.id)
            .map(|data| GetOneResponse { data })
            .ok_or_else(|| ProviderError::NotFound {
                resource: resource.to_string(),
                id: params.id.to_string(),
            })
    }
}

/// Validates a resource name.
pub fn validate_resource(resource: &str) -> ProviderResult<()> {
    if resource.is_empty() {
        return Err(ProviderError::InvalidInput {
            message: "resource cannot be empty".to_string(),
        });
    }
    if resource.len() > MAX_RESOURCE_NAME_LENGTH {
        return Err(ProviderError::InvalidInput {
            message: format!(
                "resource name exceeds {MAX_RESOURCE_NAME_LENGTH} characters: {}",
                resource.len()
            ),
        });
    }
    if resource.chars().any(char::is_whitespace) {
        return Err(ProviderError::InvalidInput {
            message: format!("resource cannot contain whitespace: '{resource}'"),
        });
    }
    Ok(())
}
