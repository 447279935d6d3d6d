//! Registry authentication.
//!
//! Anonymous pulls still go through the token handshake: the registry answers
//! `/v2/` with a `401` and a `WWW-Authenticate` challenge, and a pull-scoped
//! bearer token is requested from the realm it names.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    Basic { username: String, password: String },
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        match (username, password) {
            (Some(username), Some(password)) => Credentials::Basic { username, password },
            _ => Credentials::Anonymous,
        }
    }

    /// Attach basic auth to `request` if credentials were configured.
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::Anonymous => request,
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }
}

/// A parsed `WWW-Authenticate` header.
#[derive(Debug, PartialEq, Eq)]
pub enum Challenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

impl Challenge {
    /// Format: `Bearer realm="...",service="...",scope="..."` or `Basic realm="..."`
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));

        if scheme.eq_ignore_ascii_case("basic") {
            return Ok(Challenge::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            bail!("Unsupported authentication scheme '{scheme}'");
        }

        let mut params = parse_params(params);
        let realm = params
            .remove("realm")
            .context("Missing realm in WWW-Authenticate header")?;

        Ok(Challenge::Bearer {
            realm,
            service: params.remove("service"),
            scope: params.remove("scope"),
        })
    }
}

/// Split `key="value",key=value` pairs. Commas inside quotes are kept.
fn parse_params(s: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = s.trim();

    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();

        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            }
        };

        params.insert(key, value.to_string());
        rest = remaining.trim_start_matches([',', ' ']);
    }

    params
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Query parameters for a token request; the challenge's scope wins over the
/// default pull scope.
fn token_query(
    service: Option<&str>,
    scope: Option<&str>,
    repository: &str,
) -> Vec<(&'static str, String)> {
    let scope = scope
        .map(str::to_string)
        .unwrap_or_else(|| format!("repository:{repository}:pull"));

    let mut query = vec![("scope", scope)];
    if let Some(service) = service {
        query.push(("service", service.to_string()));
    }
    query
}

/// Ask the realm of a bearer challenge for a token allowing pulls of `repository`.
pub fn request_token(
    client: &Client,
    realm: &str,
    service: Option<&str>,
    scope: Option<&str>,
    repository: &str,
    credentials: &Credentials,
) -> Result<String> {
    let query = token_query(service, scope, repository);
    let request = credentials.apply(client.get(realm).query(&query));
    let response = request
        .send()
        .with_context(|| format!("Token request to {realm} failed"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("Token request to {realm} failed with status {status}");
    }

    let body: TokenResponse = response.json().context("Failed to parse token response")?;
    body.token
        .or(body.access_token)
        .context("No token in auth service response")
}
