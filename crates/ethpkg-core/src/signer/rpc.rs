use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use ethpkg_schema::{Address, Algorithm};

use super::{Signer, SignerError, USER_REJECTED_CODE};

/// Delegates signing to a wallet behind a JSON-RPC endpoint.
///
/// Only personal-message signing (`personal_sign`) is available; wallets do
/// not expose raw ECDSA over arbitrary digests. A wallet answering with
/// error code 4001 is reported as [`SignerError::Rejected`].
#[derive(Debug)]
pub struct RpcSigner {
    client: Client,
    url: String,
    address: Address,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

impl RpcSigner {
    pub const NAME: &'static str = "rpc";

    pub fn new(url: impl Into<String>, address: Address) -> Result<Self, SignerError> {
        let client = Client::builder().user_agent(crate::USER_AGENT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            address,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SignerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(url = %self.url, method, id, "signer rpc request");

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            if error.code == USER_REJECTED_CODE {
                return Err(SignerError::Rejected);
            }
            return Err(SignerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| SignerError::InvalidResponse("missing result".to_string()))
    }
}

#[async_trait]
impl Signer for RpcSigner {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn address(&self) -> Address {
        self.address
    }

    fn supports(&self, alg: Algorithm) -> bool {
        alg == Algorithm::Eth
    }

    async fn ec_sign(&self, _data: &[u8]) -> Result<Vec<u8>, SignerError> {
        Err(SignerError::Unsupported {
            signer: Self::NAME.to_string(),
            alg: Algorithm::Es256k,
        })
    }

    async fn eth_sign(&self, data: &[u8]) -> Result<Vec<u8>, SignerError> {
        let params = json!([format!("0x{}", hex::encode(data)), self.address.to_string()]);
        let result = self.call("personal_sign", params).await?;
        let encoded = result
            .as_str()
            .ok_or_else(|| SignerError::InvalidResponse(format!("expected hex string, got {result}")))?;
        hex::decode(encoded.trim_start_matches("0x"))
            .map_err(|e| SignerError::InvalidResponse(format!("signature is not hex: {e}")))
    }
}
