//! Thin HTTP client used by the `generate` and `register` subcommands.

use anyhow::{bail, Context};
use serde_json::{json, Map, Value};

/// Arguments of a `POST /generate` call.
#[derive(Debug, Clone, Default)]
pub struct GenerateArgs {
    pub prompt: String,
    pub provider: Option<String>,
    pub user_id: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl GenerateArgs {
    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("prompt".into(), json!(self.prompt));
        if let Some(provider) = &self.provider {
            body.insert("provider".into(), json!(provider));
        }
        if let Some(user_id) = &self.user_id {
            body.insert("user_id".into(), json!(user_id));
        }
        if let Some(temperature) = self.temperature {
            body.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = self.max_tokens {
            body.insert("max_tokens".into(), json!(max_tokens));
        }
        Value::Object(body)
    }
}

pub async fn generate(addr: &str, args: &GenerateArgs) -> anyhow::Result<Value> {
    post(addr, "generate", &args.body()).await
}

pub async fn register(addr: &str, name: &str) -> anyhow::Result<Value> {
    post(addr, "users", &json!({ "name": name })).await
}

async fn post(addr: &str, path: &str, body: &Value) -> anyhow::Result<Value> {
    let url = format!("{}/{path}", addr.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("calling {url}"))?;

    let status = response.status();
    let reply: Value = response
        .json()
        .await
        .with_context(|| format!("decoding reply from {url}"))?;
    if !status.is_success() {
        bail!("{url} returned {status}: {reply}");
    }
    Ok(reply)
}
