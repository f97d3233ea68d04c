//! HTTP client for the school administration endpoint (`api_ia.php`).

use std::time::Duration;

use async_trait::async_trait;
use aulabot_shared::{AulabotError, Fetcher, QuerySpec, RestQuery, Result, ResultRow, ResultSet};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("aulabot/", env!("CARGO_PKG_VERSION"));

/// Script every action is dispatched through.
const ENDPOINT: &str = "api_ia.php";

/// REST [`Fetcher`]: one GET per query, JSON envelope decoded into rows.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl ApiClient {
    /// Build a client for `{base_url}/api_ia.php`.
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(&format!("{}/{ENDPOINT}", base_url.trim_end_matches('/')))
            .map_err(|e| AulabotError::config(format!("invalid API base URL {base_url}: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AulabotError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Issue one action and decode its rows.
    #[instrument(skip_all, fields(action = %query.action))]
    pub async fn call(&self, query: &RestQuery) -> Result<ResultSet> {
        let mut pairs: Vec<(&str, &str)> = vec![
            ("api_key", self.api_key.as_str()),
            ("action", query.action.as_str()),
        ];
        pairs.extend(query.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&pairs)
            .send()
            .await
            .map_err(|e| classify(&query.action, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify(&query.action, e))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AulabotError::Backend(format!("{}: {reason}", query.action)));
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| AulabotError::Decode(format!("{}: {e}", query.action)))?;
        let rows = rows_from_envelope(&query.action, json)?;

        debug!(rows = rows.len(), "API call succeeded");
        Ok(rows)
    }
}

#[async_trait]
impl Fetcher for ApiClient {
    fn name(&self) -> &str {
        "rest"
    }

    async fn fetch(&self, query: &QuerySpec) -> Result<ResultSet> {
        match query {
            QuerySpec::Rest(rest) => self.call(rest).await,
            QuerySpec::Sql(_) => Err(AulabotError::validation(
                "REST backend cannot run SQL statements",
            )),
        }
    }
}

/// Timeouts and connection failures are transient; everything else is not.
fn classify(action: &str, err: reqwest::Error) -> AulabotError {
    if err.is_timeout() {
        AulabotError::Timeout(format!("{action}: {err}"))
    } else if err.is_connect() || err.is_request() {
        AulabotError::Network(format!("{action}: {err}"))
    } else if err.is_decode() || err.is_body() {
        AulabotError::Decode(format!("{action}: {err}"))
    } else {
        AulabotError::Backend(format!("{action}: {err}"))
    }
}

/// Decode `{ success, data, error }`.
///
/// `data` is a list of rows, a single row object, or absent; when absent the
/// envelope itself (minus `success`) is the row.
fn rows_from_envelope(action: &str, json: Value) -> Result<ResultSet> {
    let Value::Object(mut envelope) = json else {
        return Err(AulabotError::Decode(format!("{action}: expected a JSON object")));
    };

    let success = envelope
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !success {
        let reason = envelope
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request was not successful");
        return Err(AulabotError::Backend(format!("{action}: {reason}")));
    }

    match envelope.remove("data") {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(ResultRow::from(map)),
                other => Err(AulabotError::Decode(format!(
                    "{action}: expected row objects, got {other}"
                ))),
            })
            .collect(),
        Some(Value::Object(map)) => Ok(vec![ResultRow::from(map)]),
        Some(Value::Null) | None => {
            envelope.remove("success");
            Ok(vec![ResultRow::from(envelope)])
        }
        Some(other) => Err(AulabotError::Decode(format!(
            "{action}: unexpected data {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), "secret", Duration::from_secs(5)).expect("client")
    }

    #[test]
    fn endpoint_joins_base() {
        let c = ApiClient::new("http://localhost/SistemaAdmin/", "k", Duration::from_secs(1))
            .expect("client");
        assert_eq!(c.endpoint().as_str(), "http://localhost/SistemaAdmin/api_ia.php");
    }

    #[test]
    fn envelope_shapes() {
        let rows = rows_from_envelope(
            "estudiantes",
            json!({"success": true, "data": [{"id": 1}, {"id": 2}], "count": 2}),
        )
        .expect("array");
        assert_eq!(rows.len(), 2);

        let rows = rows_from_envelope(
            "estadisticas",
            json!({"success": true, "data": {"estudiantes": 20, "profesores": 4}}),
        )
        .expect("object");
        assert_eq!(rows[0].integer("profesores"), Some(4));

        let rows = rows_from_envelope(
            "health",
            json!({"success": true, "status": "healthy", "total_estudiantes": 19}),
        )
        .expect("bare");
        assert_eq!(rows[0].text("status").as_deref(), Some("healthy"));
        assert!(rows[0].get("success").is_none());
    }

    #[test]
    fn reported_failure_is_backend_error() {
        let err = rows_from_envelope(
            "cursos",
            json!({"success": false, "error": "Acción no encontrada"}),
        )
        .unwrap_err();
        assert!(matches!(err, AulabotError::Backend(_)));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("Acción no encontrada"));
    }

    #[tokio::test]
    async fn sends_key_action_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api_ia.php"))
            .and(query_param("api_key", "secret"))
            .and(query_param("action", "buscar_estudiantes"))
            .and(query_param("search", "Acosta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{"id": "1", "nombre": "Ana", "apellido": "Acosta"}],
                "count": 1
            })))
            .mount(&server)
            .await;

        let query = QuerySpec::Rest(RestQuery::new("buscar_estudiantes").param("search", "Acosta"));
        let rows = client(&server).fetch(&query).await.expect("fetch");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].full_name(), "Ana Acosta");
    }

    #[tokio::test]
    async fn http_error_keeps_backend_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api_ia.php"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "error": "Curso no encontrado"
            })))
            .mount(&server)
            .await;

        let query = QuerySpec::Rest(RestQuery::new("estadisticas_curso").param("curso_id", 99));
        let err = client(&server).fetch(&query).await.unwrap_err();
        assert!(matches!(err, AulabotError::Backend(_)));
        assert!(err.to_string().contains("Curso no encontrado"));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let query = QuerySpec::Rest(RestQuery::new("cursos"));
        let err = client(&server).fetch(&query).await.unwrap_err();
        assert!(matches!(err, AulabotError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "data": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), "k", Duration::from_millis(50)).expect("client");
        let err = api.fetch(&QuerySpec::Rest(RestQuery::new("cursos"))).await.unwrap_err();
        assert!(matches!(err, AulabotError::Timeout(_)), "{err}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        // port 9 (discard) is not listening on test hosts
        let api = ApiClient::new("http://127.0.0.1:9", "k", Duration::from_secs(2)).expect("client");
        let err = api.fetch(&QuerySpec::Rest(RestQuery::new("cursos"))).await.unwrap_err();
        assert!(err.is_transient(), "{err}");
    }

    #[tokio::test]
    async fn sql_queries_are_rejected() {
        let api = ApiClient::new("http://localhost", "k", Duration::from_secs(1)).expect("client");
        let query = QuerySpec::Sql(aulabot_shared::SqlQuery {
            text: "SELECT 1".into(),
            params: vec![],
        });
        assert!(matches!(
            api.fetch(&query).await,
            Err(AulabotError::Validation { .. })
        ));
    }
}
