//! HTTP server for the forwarder API.
//!
//! Operators relay signed requests through `POST /api/forward`. The read-only
//! endpoints expose what a signer needs to build a request: its next nonce
//! and the domain its signature is bound to.

use crate::apis::{forward, registry};
use axum::{
	extract::{DefaultBodyLimit, Path, State},
	http::{HeaderName, HeaderValue, Method},
	response::Json,
	routing::{get, post},
	Router,
};
use forwarder_config::{ApiConfig, CorsConfig};
use forwarder_core::{EcdsaVerifier, ForwardingEngine, SignatureVerifier};
use forwarder_types::{
	APIError, DomainResponse, ForwardApiRequest, ForwardApiResponse, NonceResponse,
	OperatorStatusResponse, OperatorsResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
	timeout::TimeoutLayer,
	trace::TraceLayer,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Engine that validates and executes forwarded requests.
	pub engine: Arc<ForwardingEngine>,
	/// Recovers the submitting operator from its signature.
	pub verifier: Arc<dyn SignatureVerifier>,
}

impl AppState {
	pub fn new(engine: Arc<ForwardingEngine>) -> Self {
		Self {
			engine,
			verifier: Arc::new(EcdsaVerifier::new()),
		}
	}
}

/// Builds the `/api` router with middleware from `api_config`.
pub fn router(state: AppState, api_config: &ApiConfig) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/forward", post(handle_forward))
				.route("/nonces/{address}", get(handle_get_nonce))
				.route("/operators", get(handle_list_operators))
				.route("/operators/{address}", get(handle_get_operator))
				.route("/domain", get(handle_get_domain)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors_layer(api_config.cors.as_ref()))
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<ForwardingEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState::new(engine), &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Forwarder API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};

	let origins = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| origin.parse::<HeaderValue>().ok());
	let methods = cors
		.allowed_methods
		.iter()
		.filter_map(|method| method.parse::<Method>().ok());
	let headers = cors
		.allowed_headers
		.iter()
		.filter_map(|header| header.parse::<HeaderName>().ok());

	CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods(AllowMethods::list(methods))
		.allow_headers(AllowHeaders::list(headers))
}

/// Handles POST /api/forward requests.
async fn handle_forward(
	State(state): State<AppState>,
	Json(body): Json<ForwardApiRequest>,
) -> Result<Json<ForwardApiResponse>, APIError> {
	match forward::process_forward_request(body, &state.engine, state.verifier.as_ref()).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Forward request failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/nonces/{address} requests.
async fn handle_get_nonce(
	Path(address): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<NonceResponse>, APIError> {
	registry::get_nonce(&address, &state.engine).await.map(Json)
}

/// Handles GET /api/operators requests.
async fn handle_list_operators(
	State(state): State<AppState>,
) -> Result<Json<OperatorsResponse>, APIError> {
	registry::list_operators(&state.engine).await.map(Json)
}

/// Handles GET /api/operators/{address} requests.
async fn handle_get_operator(
	Path(address): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OperatorStatusResponse>, APIError> {
	registry::get_operator_status(&address, &state.engine)
		.await
		.map(Json)
}

/// Handles GET /api/domain requests.
async fn handle_get_domain(State(state): State<AppState>) -> Json<DomainResponse> {
	Json(registry::get_domain(&state.engine))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::factory_registry::get_registry;
	use axum::body::Body;
	use axum::http::{header, Request, StatusCode};
	use forwarder_config::builders::config::ConfigBuilder;
	use forwarder_config::Config;
	use forwarder_core::{ForwarderBuilder, ForwarderFactories, MockVerifier};
	use forwarder_types::{parse_address, Address, Bytes, ForwardRequest, U256};
	use serde_json::Value;
	use tower::ServiceExt;

	const OPERATOR: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
	const REJECTING: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";

	fn api_config() -> ApiConfig {
		toml::from_str("enabled = true").unwrap()
	}

	async fn app_with(config: Config) -> Router {
		app_with_api(config, &api_config()).await
	}

	async fn app_with_api(config: Config, api: &ApiConfig) -> Router {
		let registry = get_registry();
		let factories = ForwarderFactories {
			storage_factories: registry.storage.clone(),
			execution_factories: registry.execution.clone(),
		};
		let engine = ForwarderBuilder::new(config)
			.with_verifier(Arc::new(MockVerifier))
			.build(factories)
			.await
			.unwrap();
		let state = AppState {
			engine: Arc::new(engine),
			verifier: Arc::new(MockVerifier),
		};
		router(state, api)
	}

	async fn app() -> Router {
		app_with(ConfigBuilder::new().operator(OPERATOR).build()).await
	}

	fn request(to: Address, nonce: u64) -> ForwardRequest {
		ForwardRequest {
			from: Address::repeat_byte(0x11),
			to,
			value: U256::ZERO,
			data: Bytes::from_static(&[0xde, 0xad]),
			nonce: U256::from(nonce),
		}
	}

	fn submission(request: ForwardRequest, submitter: &Address) -> ForwardApiRequest {
		ForwardApiRequest {
			signature: MockVerifier::sign(&request.from),
			submitter_signature: MockVerifier::sign(submitter),
			request,
		}
	}

	async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let body = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		(status, serde_json::from_slice(&body).unwrap_or(Value::Null))
	}

	async fn post_forward(app: &Router, body: &ForwardApiRequest) -> (StatusCode, Value) {
		send(
			app,
			Request::post("/api/forward")
				.header("content-type", "application/json")
				.body(Body::from(serde_json::to_vec(body).unwrap()))
				.unwrap(),
		)
		.await
	}

	async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
		send(app, Request::get(uri).body(Body::empty()).unwrap()).await
	}

	#[tokio::test]
	async fn test_forward_then_replay() {
		let app = app().await;
		let operator = parse_address(OPERATOR).unwrap();
		let body = submission(request(Address::repeat_byte(0x22), 0), &operator);

		let (status, json) = post_forward(&app, &body).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json["success"], true);
		assert_eq!(json["newNonce"], "0x1");
		assert_eq!(json["returnData"], "0xdead");
		assert_eq!(
			parse_address(json["submitter"].as_str().unwrap()).unwrap(),
			operator
		);

		let (status, json) = post_forward(&app, &body).await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(json["error"], "NONCE_MISMATCH");
		assert_eq!(json["details"]["expected"], "0x1");

		let (status, json) = get_json(&app, "/api/nonces/0x1111111111111111111111111111111111111111").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json["nonce"], "0x1");
	}

	#[tokio::test]
	async fn test_non_operator_submitter_is_unauthorized() {
		let app = app().await;
		let body = submission(request(Address::repeat_byte(0x22), 0), &Address::repeat_byte(0x99));

		let (status, json) = post_forward(&app, &body).await;
		assert_eq!(status, StatusCode::UNAUTHORIZED);
		assert_eq!(json["error"], "UNAUTHORIZED");

		let (_, json) = get_json(&app, "/api/nonces/0x1111111111111111111111111111111111111111").await;
		assert_eq!(json["nonce"], "0x0");
	}

	#[tokio::test]
	async fn test_wrong_signer_is_bad_request() {
		let app = app().await;
		let operator = parse_address(OPERATOR).unwrap();
		let mut body = submission(request(Address::repeat_byte(0x22), 0), &operator);
		body.signature = MockVerifier::sign(&Address::repeat_byte(0x33));

		let (status, json) = post_forward(&app, &body).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(json["error"], "INVALID_SIGNATURE");
	}

	#[tokio::test]
	async fn test_malformed_submitter_signature() {
		let app = app().await;
		let operator = parse_address(OPERATOR).unwrap();
		let mut body = submission(request(Address::repeat_byte(0x22), 0), &operator);
		body.submitter_signature = Bytes::from_static(&[1, 2, 3]);

		let (status, json) = post_forward(&app, &body).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(json["error"], "INVALID_SUBMITTER_SIGNATURE");
	}

	#[tokio::test]
	async fn test_reverted_call_is_unprocessable_and_consumes_nonce() {
		let execution: toml::Value =
			toml::from_str(&format!("rejecting = [\"{}\"]", REJECTING)).unwrap();
		let config = ConfigBuilder::new()
			.operator(OPERATOR)
			.revert_on_failure(true)
			.memory_execution(execution)
			.build();
		let app = app_with(config).await;
		let operator = parse_address(OPERATOR).unwrap();
		let body = submission(request(parse_address(REJECTING).unwrap(), 0), &operator);

		let (status, json) = post_forward(&app, &body).await;
		assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
		assert_eq!(json["error"], "EXECUTION_REVERTED");
		assert_eq!(json["details"]["newNonce"], "0x1");

		let (status, _) = post_forward(&app, &body).await;
		assert_eq!(status, StatusCode::CONFLICT);
	}

	#[tokio::test]
	async fn test_operator_endpoints() {
		let app = app().await;

		let (status, json) = get_json(&app, "/api/operators").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json["operators"].as_array().unwrap().len(), 1);

		let (status, json) = get_json(&app, &format!("/api/operators/{}", OPERATOR)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json["authorized"], true);

		let (status, _) = get_json(&app, "/api/operators/nope").await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn test_domain_endpoint() {
		let app = app().await;
		let (status, json) = get_json(&app, "/api/domain").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json["name"], "Forwarder");
		assert_eq!(json["version"], "0.1");
		assert_eq!(json["chainId"], 31337);
		assert_eq!(
			json["verifyingContract"],
			"0x5FbDB2315678afecb367f032d93F642f64180aa3"
		);
		assert!(json["domainSeparator"].as_str().unwrap().starts_with("0x"));
	}

	async fn preflight(app: &Router, origin: &str) -> Option<String> {
		let response = app
			.clone()
			.oneshot(
				Request::options("/api/domain")
					.header(header::ORIGIN, origin)
					.header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		response
			.headers()
			.get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
			.map(|value| value.to_str().unwrap().to_string())
	}

	#[tokio::test]
	async fn test_cors_allows_only_configured_origins() {
		let mut api = api_config();
		api.cors = Some(CorsConfig {
			allowed_origins: vec!["https://app.example".to_string()],
			allowed_headers: vec!["content-type".to_string()],
			// Invalid entries are skipped rather than failing startup.
			allowed_methods: vec!["GET".to_string(), "NOT A METHOD".to_string()],
		});
		let app = app_with_api(ConfigBuilder::new().build(), &api).await;

		assert_eq!(
			preflight(&app, "https://app.example").await.as_deref(),
			Some("https://app.example")
		);
		assert_eq!(preflight(&app, "https://other.example").await, None);
	}

	#[tokio::test]
	async fn test_cors_is_permissive_without_config() {
		let app = app().await;
		assert_eq!(
			preflight(&app, "https://other.example").await.as_deref(),
			Some("*")
		);
	}
}
