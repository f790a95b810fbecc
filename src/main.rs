#[tokio::main]
async fn main() -> anyhow::Result<()> {
    reqhound::app::run().await
}
