//! HTTP transport for the authority API

use crate::error::{Error, Result};
use crate::types::{Envelope, GameState, HashResponse, PingOutcome, ProtocolSource};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use reqwest::{header, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tc_message::{KeyPair, MessageSigner};

/// API version announced on GET requests
pub const API_VERSION: &str = "3.0.0";

const VERSION_HEADER: &str = "X-API-Version";

/// API client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the API, without trailing slash
    pub base_url: String,
    /// Shared API key (base64), used as the HMAC key for signed calls
    pub api_key: String,
    /// Value of the version header
    pub version: String,
}

impl ApiConfig {
    /// Configuration for the current API version; a trailing slash on `base_url` is dropped
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            version: API_VERSION.to_string(),
        }
    }
}

/// Client for the authority's RPC surface
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    signer: MessageSigner,
    author: String,
    last_error: Mutex<Option<(String, String)>>,
}

impl ApiClient {
    /// Create a client signing on behalf of `team`
    ///
    /// Without a key pair only plain calls succeed.
    pub fn new(config: ApiConfig, team: Option<&KeyPair>) -> Result<Self> {
        let mut signer = MessageSigner::new(&config.api_key)?;
        let mut author = String::new();
        if let Some(keys) = team {
            signer = signer.with_key_pair(keys)?;
            author = keys.public.clone();
        }
        Ok(Self {
            http: reqwest::Client::new(),
            config,
            signer,
            author,
            last_error: Mutex::new(None),
        })
    }

    /// API root every request path is appended to
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Public key string identifying the team in signed requests
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Underlying HTTP client, for sharing its connection pool
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Message and details of the last application-level error
    pub fn last_error(&self) -> Option<(String, String)> {
        self.last_error.lock().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// GET a JSON document
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        tracing::debug!("GET {}", path);
        let resp = self
            .http
            .get(self.url(path))
            .header(VERSION_HEADER, &self.config.version)
            .send()
            .await?;
        decode(check(resp).await?).await
    }

    /// POST a JSON body and decode the whole response
    pub async fn plain<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let bytes = serde_json::to_vec(body)?;
        let resp = self.post(path, bytes, "application/json; charset=utf-8").await?;
        decode(resp).await
    }

    /// POST a signed envelope and decode the `result` member
    pub async fn signed<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let bytes = self.signer.sign(body)?;
        let resp = self.post(path, bytes, "application/json; charset=utf-8").await?;
        let envelope: Envelope<Value> = decode(resp).await?;
        match envelope.error.filter(|e| !e.is_empty()) {
            Some(message) => {
                let details = envelope.details.unwrap_or_default();
                tracing::warn!("API error on {}: {}", path, message);
                *self.last_error.lock() = Some((message.clone(), details.clone()));
                Err(Error::Api { message, details })
            }
            None => {
                *self.last_error.lock() = None;
                Ok(serde_json::from_value(envelope.result.unwrap_or(Value::Null))?)
            }
        }
    }

    async fn post(&self, path: &str, body: Vec<u8>, content_type: &str) -> Result<Response> {
        tracing::debug!("POST {} ({} bytes)", path, body.len());
        let resp = self
            .http
            .post(self.url(path))
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        check(resp).await
    }

    /// Submit the protocol block of a new chain
    pub async fn add_protocol_block(&self, parent: &str, protocol: &ProtocolSource) -> Result<String> {
        let res: HashResponse = self
            .plain(&format!("/Blocks/{}/Protocol", parent), protocol)
            .await?;
        self.hash_result(res)
    }

    /// Submit the setup block carrying the game parameters
    pub async fn add_setup_block(&self, parent: &str, params: &Value) -> Result<String> {
        let res: HashResponse = self
            .plain(&format!("/Blocks/{}/Setup", parent), &json!({ "params": params }))
            .await?;
        self.hash_result(res)
    }

    fn hash_result(&self, res: HashResponse) -> Result<String> {
        if res.error.is_empty() {
            return Ok(res.hash);
        }
        *self.last_error.lock() = Some((res.error.clone(), res.details.clone()));
        Err(Error::Api {
            message: res.error,
            details: res.details,
        })
    }

    /// Create a game whose chain starts at `first_block`
    pub async fn new_game(&self, first_block: &str) -> Result<GameState> {
        self.signed(
            "/Games",
            &json!({
                "author": self.author,
                "first_block": first_block,
                "timestamp": rfc3339_now(),
            }),
        )
        .await
    }

    /// Fetch the current state of a game
    pub async fn show_game(&self, game_key: &str) -> Result<GameState> {
        #[derive(Deserialize)]
        struct Response {
            game: GameState,
        }
        let res: Response = self.get(&format!("/Games/{}", game_key)).await?;
        Ok(res.game)
    }

    /// Register bots for the team; returns the rank assigned to each
    pub async fn register(&self, game_key: &str, bot_ids: &[u32]) -> Result<Vec<u32>> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            ranks: Vec<u32>,
        }
        let res: Response = self
            .signed(
                &format!("/Games/{}", game_key),
                &json!({
                    "author": self.author,
                    "gameKey": game_key,
                    "action": "register bots",
                    "botIds": bot_ids,
                }),
            )
            .await?;
        Ok(res.ranks)
    }

    /// Submit one bot's commands for the round ending at `current_block`
    ///
    /// Fails with a round conflict (see [`Error::is_round_conflict`]) when
    /// `current_block` is no longer the head of the chain.
    pub async fn input_commands(
        &self,
        game_key: &str,
        current_block: &str,
        player: u32,
        commands: &str,
    ) -> Result<()> {
        let _: Value = self
            .signed(
                &format!("/Games/{}", game_key),
                &json!({
                    "author": self.author,
                    "gameKey": game_key,
                    "action": "enter commands",
                    "player": player,
                    "current_block": current_block,
                    "commands": commands,
                }),
            )
            .await?;
        Ok(())
    }

    /// Ask the authority to close the round; returns the collected commands
    pub async fn close_round(&self, game_key: &str, current_block: &str) -> Result<Value> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            commands: Value,
        }
        let res: Option<Response> = self
            .signed(
                &format!("/Games/{}", game_key),
                &json!({
                    "author": self.author,
                    "gameKey": game_key,
                    "action": "close round",
                    "current_block": current_block,
                }),
            )
            .await?;
        Ok(res.map(|r| r.commands).unwrap_or(Value::Null))
    }

    /// Ping every node playing the game
    ///
    /// The authority streams one status line at a time and ends with either
    /// `OK` or `timeout`.
    pub async fn ping(&self, game_key: &str) -> Result<PingOutcome> {
        let bytes = self.signer.sign(&json!({
            "author": self.author,
            "gameKey": game_key,
            "action": "ping",
            "timestamp": millis_now(),
        }))?;
        let resp = self
            .post(&format!("/Games/{}", game_key), bytes, "text/plain")
            .await?;
        let text = resp.text().await?;
        for line in text.lines() {
            match line.trim() {
                "OK" => return Ok(PingOutcome::AllResponsive),
                "timeout" => return Ok(PingOutcome::SomeUnresponsive),
                other => tracing::trace!("ping: {}", other),
            }
        }
        Err(Error::Transport {
            status: "incomplete ping response".to_string(),
            body: text,
        })
    }

    /// Answer a ping event on behalf of the team's bots
    pub async fn pong(&self, game_key: &str, payload: &str, bot_ids: &[u32]) -> Result<()> {
        let _: Value = self
            .signed(
                &format!("/Games/{}", game_key),
                &json!({
                    "author": self.author,
                    "gameKey": game_key,
                    "action": "pong",
                    "payload": payload,
                    "botIds": bot_ids,
                    "timestamp": millis_now(),
                }),
            )
            .await?;
        Ok(())
    }

    /// Current time according to the authority
    pub async fn server_time(&self) -> Result<DateTime<Utc>> {
        let text: String = self.get("/Time").await?;
        Ok(DateTime::parse_from_rfc3339(&text)?.with_timezone(&Utc))
    }

    /// Open an event-stream session; returns its key
    pub async fn open_event_stream(&self) -> Result<String> {
        self.signed(
            "/Events",
            &json!({
                "author": self.author,
                "timestamp": rfc3339_now(),
            }),
        )
        .await
    }

    /// Add channels to an event-stream session
    pub async fn subscribe(&self, stream_key: &str, channels: &[String]) -> Result<()> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            error: String,
            #[serde(default)]
            details: String,
        }
        tracing::info!("Subscribing to {:?}", channels);
        let res: Response = self
            .plain(
                &format!("/Events/{}", stream_key),
                &json!({ "subscribe": channels }),
            )
            .await?;
        if res.error.is_empty() {
            Ok(())
        } else {
            Err(Error::Api {
                message: res.error,
                details: res.details,
            })
        }
    }

    /// URL of the server-push stream for a session
    pub fn events_url(&self, stream_key: &str) -> String {
        self.url(&format!("/Events/{}", stream_key))
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::debug!("HTTP {}: {}", status, body);
    Err(Error::Transport {
        status: status.to_string(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let bytes = resp.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_slice(b"null")?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

fn rfc3339_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn millis_now() -> String {
    Utc::now().timestamp_millis().to_string()
}
