//! SCIM v2 envelope: resource representation, list responses and list
//! query parameters.

pub mod filter;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{
    Json,
    extract::{FromRequest, Request},
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::{ListQuery, SortOrder};
use crate::error::{ConsoleError, ConsoleResult};
use filter::AttributeMap;

pub const SCIM_CONTENT_TYPE: &str = "application/scim+json";
pub const LIST_RESPONSE_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";
pub const BASE_PATH: &str = "/scim/v2";

pub fn schema_urn(resource_type: &str) -> String {
    format!("urn:oidc-console:scim:schemas:core:2.0:{resource_type}")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub resource_type: &'static str,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub location: String,
}

/// A resource as it goes over the wire: `schemas`, `id`, its attributes and `meta`.
#[derive(Debug, Clone, Serialize)]
pub struct ScimResource<T> {
    pub schemas: Vec<String>,
    pub id: String,
    #[serde(flatten)]
    pub attributes: T,
    pub meta: Meta,
}

impl<T> ScimResource<T> {
    pub fn new(
        resource_type: &'static str,
        id: impl ToString,
        attributes: T,
        created: DateTime<Utc>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        let id = id.to_string();
        // form encoding escapes a literal '+', so every '+' left is a space
        let segment = url::form_urlencoded::byte_serialize(id.as_bytes())
            .collect::<String>()
            .replace('+', "%20");
        Self {
            schemas: vec![schema_urn(resource_type)],
            meta: Meta {
                resource_type,
                created,
                last_modified,
                location: format!("{BASE_PATH}/{resource_type}/{segment}"),
            },
            id,
            attributes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub schemas: Vec<String>,
    pub total_results: i64,
    pub items_per_page: i64,
    pub start_index: i64,
    #[serde(rename = "Resources")]
    pub resources: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(resources: Vec<T>, total_results: i64, start_index: i64) -> Self {
        Self {
            schemas: vec![LIST_RESPONSE_SCHEMA.to_string()],
            total_results,
            items_per_page: resources.len() as i64,
            start_index,
            resources,
        }
    }
}

/// JSON body with the SCIM content type.
pub struct Scim<T>(pub StatusCode, pub T);

impl<T> Scim<T> {
    pub fn ok(body: T) -> Self {
        Self(StatusCode::OK, body)
    }

    pub fn created(body: T) -> Self {
        Self(StatusCode::CREATED, body)
    }
}

impl<T: Serialize> IntoResponse for Scim<T> {
    fn into_response(self) -> Response {
        let mut response = (self.0, Json(self.1)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(SCIM_CONTENT_TYPE),
        );
        response
    }
}

/// JSON request body. Malformed input becomes a `400` with
/// `errorMessages`; an oversized body keeps its `413`.
pub struct ScimBody<T>(pub T);

impl<T, S> FromRequest<S> for ScimBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(body)) => Ok(ScimBody(body)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(rejection.into_response())
            }
            Err(rejection) => {
                Err(ConsoleError::BadRequest(rejection.body_text()).into_response())
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub filter: Option<String>,
    pub start_index: Option<i64>,
    pub count: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl ListParams {
    /// Resolve against the filterable attributes of a resource. Returns the
    /// query and the effective one based start index.
    pub fn to_query(
        &self,
        attributes: AttributeMap,
        default_count: i64,
        max_count: i64,
    ) -> ConsoleResult<(ListQuery, i64)> {
        let start_index = self.start_index.unwrap_or(1);
        if start_index < 1 {
            return Err(ConsoleError::BadRequest(
                "startIndex must be 1 or greater".into(),
            ));
        }
        let count = self
            .count
            .unwrap_or(default_count)
            .clamp(0, max_count.max(0));

        let predicates = match self.filter.as_deref().map(str::trim) {
            Some(filter) if !filter.is_empty() => filter::parse(filter, attributes)?,
            _ => Vec::new(),
        };

        let order = match self.sort_order.as_deref() {
            None => SortOrder::Ascending,
            Some(o) if o.eq_ignore_ascii_case("ascending") => SortOrder::Ascending,
            Some(o) if o.eq_ignore_ascii_case("descending") => SortOrder::Descending,
            Some(o) => {
                return Err(ConsoleError::BadRequest(format!(
                    "sortOrder must be 'ascending' or 'descending', got '{o}'"
                )));
            }
        };
        let sort = match self.sort_by.as_deref() {
            None => None,
            Some(attr) => Some((
                filter::column_for(attributes, attr).ok_or_else(|| {
                    ConsoleError::BadRequest(format!("cannot sort by '{attr}'"))
                })?,
                order,
            )),
        };

        Ok((
            ListQuery {
                predicates,
                sort,
                offset: start_index - 1,
                limit: count,
            },
            start_index,
        ))
    }
}

/// Numeric resource id from a path segment; anything else cannot exist.
pub fn parse_id(resource: &'static str, raw: &str) -> ConsoleResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| ConsoleError::not_found(resource, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Op;

    const ATTRS: AttributeMap = &[("name", "name"), ("created", "created")];

    #[test]
    fn paging_is_clamped() {
        let params = ListParams {
            start_index: Some(3),
            count: Some(1_000),
            ..Default::default()
        };
        let (query, start) = params.to_query(ATTRS, 25, 100).unwrap();
        assert_eq!(start, 3);
        assert_eq!(query.offset, 2);
        assert_eq!(query.limit, 100);

        let (query, start) = ListParams::default().to_query(ATTRS, 25, 100).unwrap();
        assert_eq!((start, query.limit), (1, 25));

        let bad = ListParams {
            start_index: Some(0),
            ..Default::default()
        };
        assert!(bad.to_query(ATTRS, 25, 100).is_err());
    }

    #[test]
    fn filter_and_sort_resolve_to_columns() {
        let params = ListParams {
            filter: Some(r#"name co "idp""#.into()),
            sort_by: Some("Created".into()),
            sort_order: Some("descending".into()),
            ..Default::default()
        };
        let (query, _) = params.to_query(ATTRS, 25, 100).unwrap();
        assert_eq!(query.predicates[0].op, Op::Contains);
        assert_eq!(query.sort, Some(("created", SortOrder::Descending)));

        let unknown = ListParams {
            sort_by: Some("password".into()),
            ..Default::default()
        };
        assert!(unknown.to_query(ATTRS, 25, 100).is_err());
    }

    #[test]
    fn resource_location_is_escaped() {
        let now = Utc::now();
        let resource = ScimResource::new("Keystore", "my key", (), now, now);
        assert_eq!(resource.meta.location, "/scim/v2/Keystore/my%20key");
        let resource = ScimResource::new("Keystore", "a+b/c", (), now, now);
        assert_eq!(resource.meta.location, "/scim/v2/Keystore/a%2Bb%2Fc");
        assert_eq!(
            resource.schemas,
            vec!["urn:oidc-console:scim:schemas:core:2.0:Keystore".to_string()]
        );
    }
}
