//! GitHub implementation of [`TreeClient`] and [`InstallationApi`].

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::graphql;
use super::{BatchQuery, BatchResult, InstallationApi, MintedToken, RemoteError, TreeClient};
use crate::config::{AppCredentials, Config};
use crate::types::{Namespace, RepoKey};

const USER_AGENT: &str = concat!("ghmirror/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// Blocking GitHub client over a shared ureq agent.
pub struct GithubClient {
    agent: ureq::Agent,
    api_url: String,
    app: Option<AppCredentials>,
}

impl GithubClient {
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            app: config.app.clone(),
        }
    }

    fn graphql_url(&self) -> String {
        format!("{}/graphql", self.api_url)
    }

    /// Short-lived RS256 JWT identifying the app itself.
    fn app_jwt(&self) -> Result<String, RemoteError> {
        #[derive(Debug, Serialize)]
        struct Claims {
            iat: i64,
            exp: i64,
            iss: String,
        }

        let app = self.app.as_ref().ok_or(RemoteError::MissingAppCredentials)?;
        let now = Utc::now().timestamp();
        // Backdated to tolerate clock drift; GitHub caps exp at ten minutes.
        let claims = Claims {
            iat: now - 60,
            exp: now + 540,
            iss: app.app_id.clone(),
        };
        let key = EncodingKey::from_rsa_pem(app.private_key_pem.as_bytes())
            .map_err(|e| RemoteError::Jwt(e.to_string()))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| RemoteError::Jwt(e.to_string()))
    }
}

impl TreeClient for GithubClient {
    fn fetch_batch(
        &self,
        ns: &Namespace,
        queries: &[BatchQuery],
        credential: &str,
    ) -> Result<Vec<BatchResult>, RemoteError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        log::debug!("graphql batch of {} expressions for {}", queries.len(), ns);
        let body = graphql::build_request(ns, queries);
        let response = self
            .agent
            .post(&self.graphql_url())
            .set("Authorization", &format!("bearer {}", credential))
            .send_json(body)?;

        let text = response
            .into_string()
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        graphql::parse_response(ns, queries, &text)
    }
}

#[derive(Debug, Deserialize)]
struct InstallationPayload {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct AccessTokenPayload {
    token: String,
    expires_at: String,
}

fn parse_expiry(value: &str) -> Result<i64, RemoteError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc).timestamp())
        .map_err(|e| RemoteError::InvalidResponse(format!("expires_at {:?}: {}", value, e)))
}

impl InstallationApi for GithubClient {
    fn find_installation(&self, key: &RepoKey) -> Result<Option<u64>, RemoteError> {
        let jwt = self.app_jwt()?;
        let url = format!("{}/repos/{}/{}/installation", self.api_url, key.owner, key.repo);

        let result = self
            .agent
            .get(&url)
            .set("Accept", ACCEPT)
            .set("X-GitHub-Api-Version", API_VERSION)
            .set("Authorization", &format!("Bearer {}", jwt))
            .call();

        match result {
            Ok(response) => {
                let payload: InstallationPayload = response
                    .into_json()
                    .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
                Ok(Some(payload.id))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn mint_installation_token(&self, installation_id: u64) -> Result<MintedToken, RemoteError> {
        let jwt = self.app_jwt()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, installation_id
        );

        let response = self
            .agent
            .post(&url)
            .set("Accept", ACCEPT)
            .set("X-GitHub-Api-Version", API_VERSION)
            .set("Authorization", &format!("Bearer {}", jwt))
            .call()?;

        let payload: AccessTokenPayload = response
            .into_json()
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        Ok(MintedToken {
            expires_at: parse_expiry(&payload.expires_at)?,
            token: payload.token,
        })
    }
}
