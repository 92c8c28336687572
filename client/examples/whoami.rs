use anyhow::Result;
use arena_client::{ArenaClient, ClientConfig, SessionPhase};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env()?;
    let client = ArenaClient::new(&config)?;

    client.session().bootstrap().await;
    let state = client.session().state();

    match (state.phase(), &state.user) {
        (SessionPhase::LoggedIn, Some(user)) => {
            println!("id:       {}", user.id);
            println!("username: {}", user.username);
            println!("email:    {}", user.email);
            println!("admin:    {}", user.is_admin());
        }
        (phase, _) => println!("No active session ({:?})", phase),
    }

    Ok(())
}
