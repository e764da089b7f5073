//! HMAC-signed HTTP implementations of the egress traits.
//!
//! Every command carries `X-Brain-Timestamp`, `X-Brain-Nonce` and an
//! `X-Brain-Signature` over `timestamp|nonce|body`, mirroring the ingress
//! contract so both directions verify the same way.

use anyhow::{Context, Result};
use async_trait::async_trait;
use brain_core::{signing, Position};
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::types::{AccountBalances, OrderCommand, SubmitAck, TransferAck, TransferRequest};
use crate::{ExecutionEngine, WalletApi};

/// Per-attempt RPC timeout against the execution engine.
const ENGINE_TIMEOUT: Duration = Duration::from_millis(500);

/// Wallet transfers settle slower than order RPCs.
const WALLET_TIMEOUT: Duration = Duration::from_secs(5);

struct SignedHttp {
    client: Client,
    base_url: String,
    secret: Vec<u8>,
}

impl SignedHttp {
    fn new(base_url: String, secret: Vec<u8>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret,
        })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let body_json = serde_json::to_string(body).context("serializing request body")?;
        let timestamp_ms = Utc::now().timestamp_millis();
        let nonce = Uuid::new_v4().to_string();
        let signature = signing::sign(
            &self.secret,
            &signing::message(timestamp_ms, &nonce, &body_json),
        );

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("x-brain-timestamp", timestamp_ms.to_string())
            .header("x-brain-nonce", &nonce)
            .header("x-brain-signature", &signature)
            .body(body_json)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("POST {url} returned {status}: {text}");
        }
        response
            .json::<R>()
            .await
            .with_context(|| format!("decoding response from {url}"))
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let timestamp_ms = Utc::now().timestamp_millis();
        let nonce = Uuid::new_v4().to_string();
        let signature = signing::sign(
            &self.secret,
            &signing::message(timestamp_ms, &nonce, ""),
        );

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("x-brain-timestamp", timestamp_ms.to_string())
            .header("x-brain-nonce", &nonce)
            .header("x-brain-signature", &signature)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("GET {url} returned {status}: {text}");
        }
        response
            .json::<R>()
            .await
            .with_context(|| format!("decoding response from {url}"))
    }
}

/// Execution engine over HTTP.
pub struct HttpExecutionClient {
    http: SignedHttp,
}

impl HttpExecutionClient {
    pub fn new(base_url: String, secret: Vec<u8>) -> Result<Self> {
        Ok(Self {
            http: SignedHttp::new(base_url, secret, ENGINE_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl ExecutionEngine for HttpExecutionClient {
    async fn submit(&self, order: &OrderCommand) -> Result<SubmitAck> {
        self.http.post("/orders", order).await
    }

    async fn flatten(&self, reason: &str) -> Result<()> {
        #[derive(Serialize)]
        struct FlattenBody<'a> {
            reason: &'a str,
        }
        let _: serde_json::Value = self.http.post("/flatten", &FlattenBody { reason }).await?;
        Ok(())
    }

    async fn query_positions(&self) -> Result<Vec<Position>> {
        self.http.get("/positions").await
    }

    async fn query_balances(&self) -> Result<AccountBalances> {
        self.http.get("/balances").await
    }
}

/// Exchange wallet over HTTP.
pub struct HttpWalletClient {
    http: SignedHttp,
}

impl HttpWalletClient {
    pub fn new(base_url: String, secret: Vec<u8>) -> Result<Self> {
        Ok(Self {
            http: SignedHttp::new(base_url, secret, WALLET_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl WalletApi for HttpWalletClient {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferAck> {
        self.http.post("/transfers", request).await
    }
}
