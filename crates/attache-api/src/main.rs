use attache_core::Config;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let (state, router) = attache_api::setup::initialize_app(config.clone()).await?;

    attache_api::setup::server::start_server(&config, router).await?;

    if let Some(tasks) = &state.tasks {
        tasks.shutdown().await;
    }

    Ok(())
}
