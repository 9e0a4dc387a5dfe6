use std::collections::BTreeMap;

use reqwest::Url;

use super::executor::NetworkError;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// The closed set of API operations this client can perform. Each variant
/// resolves to one concrete request shape; nothing else ever reaches the
/// network, so every call goes through the pinned transport.
#[derive(Debug, Clone)]
pub enum ApiEndpoint {
    /// GET `{base}/users`
    Users,
    /// GET `{base}/users` with the given parameters as query items.
    UsersWithId { params: BTreeMap<String, String> },
}

/// A descriptor resolved to concrete request data, ready for the transport.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiEndpoint {
    fn path(&self) -> &'static str {
        match self {
            ApiEndpoint::Users | ApiEndpoint::UsersWithId { .. } => "users",
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            ApiEndpoint::Users | ApiEndpoint::UsersWithId { .. } => HttpMethod::Get,
        }
    }

    fn params(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ApiEndpoint::Users => None,
            ApiEndpoint::UsersWithId { params } => Some(params),
        }
    }

    /// Request body for body-bearing operations. None of the current
    /// operations carry one.
    fn body(&self) -> Option<serde_json::Value> {
        None
    }

    /// Headers specific to this operation, layered over the common set.
    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Map the operation to method, URL, headers and body. The URL is the
    /// base concatenated with the operation path; parameters become query
    /// items with their standard encoding.
    pub fn resolve(&self, base_url: &str) -> Result<ResolvedRequest, NetworkError> {
        let mut url =
            Url::parse(&format!("{}{}", base_url, self.path())).map_err(|_| NetworkError::InvalidUrl)?;

        if let Some(params) = self.params() {
            if !params.is_empty() {
                let mut pairs = url.query_pairs_mut();
                for (name, value) in params {
                    pairs.append_pair(name, value);
                }
            }
        }

        Ok(ResolvedRequest {
            method: self.method(),
            url,
            headers: merge_headers(common_headers(), self.headers()),
            body: self.body(),
        })
    }
}

/// Headers every request carries.
pub fn common_headers() -> Vec<(String, String)> {
    vec![("Content-Type".to_string(), "application/json".to_string())]
}

/// Operation-specific headers override the common set, matched by
/// case-insensitive name.
fn merge_headers(
    common: Vec<(String, String)>,
    specific: Vec<(String, String)>,
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = common
        .into_iter()
        .filter(|(name, _)| {
            !specific
                .iter()
                .any(|(s, _)| s.eq_ignore_ascii_case(name))
        })
        .collect();
    merged.extend(specific);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://reqres.in/api/";

    #[test]
    fn users_resolves_to_get_users() {
        let resolved = ApiEndpoint::Users.resolve(BASE).unwrap();
        assert_eq!(resolved.method, HttpMethod::Get);
        assert_eq!(resolved.url.as_str(), "https://reqres.in/api/users");
        assert!(resolved.body.is_none());
    }

    #[test]
    fn users_with_id_serializes_params_as_query_items() {
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), "42".to_string());

        let endpoint = ApiEndpoint::UsersWithId { params };
        let resolved = endpoint.resolve(BASE).unwrap();
        assert_eq!(resolved.method, HttpMethod::Get);
        assert_eq!(resolved.url.path(), "/api/users");
        assert_eq!(resolved.url.query(), Some("id=42"));
    }

    #[test]
    fn users_with_multiple_params_keeps_all_query_items() {
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), "42".to_string());
        params.insert("page".to_string(), "2".to_string());

        let resolved = ApiEndpoint::UsersWithId { params }.resolve(BASE).unwrap();
        let query = resolved.url.query().unwrap();
        assert!(query.contains("id=42"));
        assert!(query.contains("page=2"));
    }

    #[test]
    fn empty_params_leave_url_without_query() {
        let endpoint = ApiEndpoint::UsersWithId {
            params: BTreeMap::new(),
        };
        let resolved = endpoint.resolve(BASE).unwrap();
        assert_eq!(resolved.url.query(), None);
    }

    #[test]
    fn malformed_base_url_is_invalid_url() {
        let err = ApiEndpoint::Users.resolve("not a url").unwrap_err();
        assert!(matches!(err, NetworkError::InvalidUrl));
    }

    #[test]
    fn every_request_carries_the_common_headers() {
        let resolved = ApiEndpoint::Users.resolve(BASE).unwrap();
        assert_eq!(
            resolved.headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn specific_headers_override_common_ones() {
        let merged = merge_headers(
            common_headers(),
            vec![("content-type".to_string(), "text/plain".to_string())],
        );
        assert_eq!(
            merged,
            vec![("content-type".to_string(), "text/plain".to_string())]
        );
    }
}
