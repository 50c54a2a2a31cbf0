//! Blocking HTTP (ureq) moved off the async runtime.

use serde::de::DeserializeOwned;
use serde_json::Value;

pub(crate) async fn get_json<R>(url: String) -> Result<R, String>
where
    R: DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut resp = ureq::get(url.as_str())
            .call()
            .map_err(|e| format!("GET {url}: {e}"))?;
        resp.body_mut()
            .read_json::<R>()
            .map_err(|e| format!("GET {url}: invalid response body: {e}"))
    })
    .await
    .map_err(|e| format!("http task failed: {e}"))?
}

pub(crate) async fn post_json<R>(url: String, body: Value) -> Result<R, String>
where
    R: DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut resp = ureq::post(url.as_str())
            .send_json(&body)
            .map_err(|e| format!("POST {url}: {e}"))?;
        resp.body_mut()
            .read_json::<R>()
            .map_err(|e| format!("POST {url}: invalid response body: {e}"))
    })
    .await
    .map_err(|e| format!("http task failed: {e}"))?
}
