use std::time::Duration;

use resilient_http::{CallContext, ClientOptions, Request, ResilientClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/status/503".to_owned());

    let opts = ClientOptions::from_env().map_err(anyhow::Error::msg)?;
    let client = ResilientClient::from_options(opts)?;
    let ctx = CallContext::new().with_timeout(Duration::from_secs(30));

    let response = client.execute(Request::get(&url)?, &ctx).await?;
    println!("{} -> {}", url, response.status());
    println!("{}", response.text().await?);

    Ok(())
}
