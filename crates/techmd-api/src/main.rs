use techmd_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let (state, router) = techmd_api::setup::initialize_app(config.clone()).await?;

    techmd_api::setup::server::start_server(&config, router).await?;

    // Server stopped accepting requests; let running generations finish.
    state.task_queue.shutdown().await;
    techmd_infra::shutdown_telemetry().await;

    Ok(())
}
