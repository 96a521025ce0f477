//! Resolve source ids to human readable names through the inventory API.
//!
//! Ids are first looked up as applications (`/v3/apps`), whatever is left over as
//! service instances (`/v2/service_instances`). Ids matching neither are simply absent
//! from the result.

// Local crates
use crate::client::client::{ClientConfig, build_http, endpoint, fetch, parse_base};
use crate::client::error::ClientError;
use crate::parser::parser::DecodeError;

// External crates
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSource {
    pub guid: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct AppsPage {
    #[serde(default)]
    resources: Vec<AppResource>,
}

#[derive(Debug, Deserialize)]
struct AppResource {
    guid: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ServiceInstancesPage {
    #[serde(default)]
    resources: Vec<ServiceInstanceResource>,
}

#[derive(Debug, Deserialize)]
struct ServiceInstanceResource {
    metadata: ServiceInstanceMetadata,
    entity: ServiceInstanceEntity,
}

#[derive(Debug, Deserialize)]
struct ServiceInstanceMetadata {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct ServiceInstanceEntity {
    name: String,
}

#[derive(Debug, Clone)]
pub struct NameResolver {
    http: reqwest::Client,
    base: Url,
    timeout: Duration,
    batch_size: usize,
}

impl NameResolver {
    pub fn new(config: &ClientConfig, batch_size: usize) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http(config.token.as_deref())?,
            base: parse_base(&config.addr)?,
            timeout: config.timeout,
            batch_size: batch_size.max(1),
        })
    }

    #[instrument(
        name = "name_resolver::resolve",
        target = "client::names::NameResolver",
        skip_all,
        fields(ids = source_ids.len()),
        level = "debug"
    )]
    pub async fn resolve(&self, source_ids: &[String]) -> Result<Vec<NamedSource>, ClientError> {
        let mut named = self.lookup_apps(source_ids).await?;

        let known: HashSet<&str> = named.iter().map(|s| s.guid.as_str()).collect();
        let remaining: Vec<String> = source_ids
            .iter()
            .filter(|id| !known.contains(id.as_str()))
            .cloned()
            .collect();

        named.extend(self.lookup_service_instances(&remaining).await?);
        tracing::debug!(resolved = named.len(), "Resolved source names");
        Ok(named)
    }

    async fn lookup_apps(&self, ids: &[String]) -> Result<Vec<NamedSource>, ClientError> {
        let mut named = Vec::new();
        for chunk in ids.chunks(self.batch_size) {
            let url = self.guid_query(&["v3", "apps"], chunk)?;
            let body = fetch(&self.http, &url, self.timeout).await?;
            let page: AppsPage = parse_page(&url, &body)?;
            named.extend(page.resources.into_iter().map(|app| NamedSource {
                guid: app.guid,
                name: app.name,
            }));
        }
        Ok(named)
    }

    async fn lookup_service_instances(&self, ids: &[String]) -> Result<Vec<NamedSource>, ClientError> {
        let mut named = Vec::new();
        for chunk in ids.chunks(self.batch_size) {
            let url = self.guid_query(&["v2", "service_instances"], chunk)?;
            let body = fetch(&self.http, &url, self.timeout).await?;
            let page: ServiceInstancesPage = parse_page(&url, &body)?;
            named.extend(page.resources.into_iter().map(|instance| NamedSource {
                guid: instance.metadata.guid,
                name: instance.entity.name,
            }));
        }
        Ok(named)
    }

    fn guid_query(&self, segments: &[&str], guids: &[String]) -> Result<Url, ClientError> {
        let mut url = endpoint(&self.base, segments)?;
        url.query_pairs_mut().append_pair("guids", &guids.join(","));
        Ok(url)
    }
}

fn parse_page<T: for<'de> Deserialize<'de>>(url: &Url, body: &[u8]) -> Result<T, ClientError> {
    serde_json::from_slice(body).map_err(|e| ClientError::MalformedResponse {
        url: url.to_string(),
        source: DecodeError::Json(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(server: &MockServer, batch_size: usize) -> NameResolver {
        let config = ClientConfig {
            addr: server.uri(),
            token: Some("bearer t".into()),
            timeout: Duration::from_secs(5),
        };
        NameResolver::new(&config, batch_size).unwrap()
    }

    #[tokio::test]
    async fn apps_then_service_instances() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/apps"))
            .and(query_param("guids", "a,b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resources": [{"guid": "a", "name": "app-a"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/service_instances"))
            .and(query_param("guids", "b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resources": [{"metadata": {"guid": "b"}, "entity": {"name": "db"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let named = resolver(&server, 50)
            .resolve(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(
            named,
            vec![
                NamedSource { guid: "a".into(), name: "app-a".into() },
                NamedSource { guid: "b".into(), name: "db".into() },
            ]
        );
    }

    #[tokio::test]
    async fn ids_are_batched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/apps"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"resources": []})))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/service_instances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"resources": []})))
            .expect(3)
            .mount(&server)
            .await;

        let ids: Vec<String> = (0..5).map(|i| format!("id-{i}")).collect();
        let named = resolver(&server, 2).resolve(&ids).await.unwrap();
        assert!(named.is_empty());
    }

    #[tokio::test]
    async fn garbage_page_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/apps"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = resolver(&server, 50).resolve(&["a".to_string()]).await.unwrap_err();
        assert!(err.is_malformed());
    }
}
