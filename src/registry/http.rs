/// Registry client for the OCI distribution API:
/// - GET /v2/ - API version check and auth challenge
/// - GET /v2/<name>/manifests/<reference> - Fetch manifest
/// - GET /v2/<name>/blobs/<digest> - Fetch blob
use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use oci_spec::image::ImageManifest;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, WWW_AUTHENTICATE};

use super::auth::{self, Challenge, Credentials};
use super::{LayerDescriptor, Registry};

pub const DOCKER_HUB: &str = "https://registry-1.docker.io";

const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

enum Authorization {
    None,
    Basic,
    Bearer(String),
}

pub struct HttpRegistry {
    client: Client,
    base_url: String,
    credentials: Credentials,
    /// Authorization negotiated for the repository it was requested for
    auth: Option<(String, Authorization)>,
}

impl HttpRegistry {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("regextract/", env!("CARGO_PKG_VERSION")))
            .timeout(None::<Duration>)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            auth: None,
        })
    }

    /// Docker Hub keeps official images under `library/`.
    fn api_repository(&self, repository: &str) -> String {
        let is_hub = self.base_url == DOCKER_HUB || self.base_url == "https://docker.io";
        if is_hub && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository.to_string()
        }
    }

    fn authorize(&mut self, repository: &str) -> Result<()> {
        if matches!(&self.auth, Some((repo, _)) if repo == repository) {
            return Ok(());
        }

        let v2_url = format!("{}/v2/", self.base_url);
        let response = self
            .client
            .get(&v2_url)
            .send()
            .with_context(|| format!("Cannot connect to registry {}", self.base_url))?;

        let authorization = match response.status() {
            StatusCode::OK => Authorization::None,
            StatusCode::UNAUTHORIZED => {
                let header = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .context("No WWW-Authenticate header in 401 response")?
                    .to_str()
                    .context("Invalid WWW-Authenticate header")?;

                match Challenge::parse(header)? {
                    Challenge::Bearer { realm, service, scope } => {
                        // Without a scope in the challenge a pull scope for `repository` is asked for.
                        let token = auth::request_token(
                            &self.client,
                            &realm,
                            service.as_deref(),
                            scope.as_deref(),
                            repository,
                            &self.credentials,
                        )?;
                        Authorization::Bearer(token)
                    }
                    Challenge::Basic => {
                        if self.credentials == Credentials::Anonymous {
                            bail!("Registry {} requires a username and password", self.base_url);
                        }
                        Authorization::Basic
                    }
                }
            }
            status => bail!("Unexpected status from {v2_url}: {status}"),
        };

        self.auth = Some((repository.to_string(), authorization));
        Ok(())
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some((_, Authorization::Bearer(token))) => request.bearer_auth(token),
            Some((_, Authorization::Basic)) => self.credentials.apply(request),
            _ => request,
        }
    }

    fn get(&self, url: &str, accept: Option<&str>) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = self
            .with_auth(request)
            .send()
            .with_context(|| format!("Request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("{url} returned {status}: {}", body.trim());
        }
        Ok(response)
    }
}

impl Registry for HttpRegistry {
    fn fetch_manifest(&mut self, repository: &str, tag: &str) -> Result<Vec<LayerDescriptor>> {
        let repository = self.api_repository(repository);
        self.authorize(&repository)?;

        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repository, tag);
        let accept = format!("{OCI_MANIFEST}, {DOCKER_MANIFEST_V2}");
        let response = self.get(&url, Some(&accept))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if content_type.contains("index") || content_type.contains("manifest.list") {
            bail!("{repository}:{tag} is a multi-architecture image index ({content_type}), which is not supported");
        }

        let manifest = ImageManifest::from_reader(response)
            .with_context(|| format!("Failed to parse manifest for {repository}:{tag}"))?;

        Ok(manifest
            .layers()
            .iter()
            .map(|layer| LayerDescriptor {
                digest: layer.digest().to_string(),
                size: layer.size(),
            })
            .collect())
    }

    fn download_layer(&mut self, repository: &str, digest: &str) -> Result<Box<dyn Read>> {
        let repository = self.api_repository(repository);
        self.authorize(&repository)?;

        let url = format!("{}/v2/{}/blobs/{}", self.base_url, repository, digest);
        let response = self.get(&url, None)?;
        Ok(Box::new(response))
    }
}
