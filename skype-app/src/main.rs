//! skype-app: sign in, print the event stream, echo direct messages.
//!
//! Credentials come from the environment:
//!   SKYPE_USERNAME=alice SKYPE_PASSWORD=... cargo run -p skype-app
//!
//! Set SKYPE_TOKEN instead of SKYPE_PASSWORD for a Microsoft account, and
//! SKYPE_SERVER=host:port to use a different notification server.

use std::env;

use skype_client::transport::parse_target;
use skype_client::{Client, Config, Credentials, Event};

#[tokio::main]
async fn main() {
    // Enable logging: RUST_LOG=skype_client=debug cargo run -p skype-app
    if env::var("RUST_LOG").is_err() {
        // SAFETY: single-threaded at this point, no other threads reading env
        unsafe { env::set_var("RUST_LOG", "skype_client=info,skype_app=info"); }
    }
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("\n✗ {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let Some(config) = config_from_env()? else {
        eprintln!("Set SKYPE_USERNAME and either SKYPE_PASSWORD (Skype account) or SKYPE_TOKEN (Microsoft account).");
        std::process::exit(1);
    };

    println!("🔌 Connecting …");
    let (client, mut events) = Client::connect(config).await?;
    println!("✅ Signed in as {} (endpoint {})", client.username(), client.epid());

    // ── Event loop ─────────────────────────────────────────────────────
    println!("\n👂 Listening for events (Ctrl+C to quit) …\n");
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => event,
        };
        let Some(event) = event else { break };
        match event {
            Event::UserMessage { sender, message } => {
                println!("📨 {sender}: {}", message.text);
                // Echo back
                if let Err(e) = client.send_user_message(&sender, &format!("Echo: {}", message.text)).await {
                    eprintln!("✗ echo failed: {e}");
                }
            }
            Event::GroupMessage { group, sender, message } => {
                println!("👥 [{group}] {sender}: {}", message.text);
            }
            Event::UsersAdded { group, users } => println!("➕ [{group}] joined: {users:?}"),
            Event::UsersRemoved { group, users } => println!("➖ [{group}] left: {users:?}"),
            Event::TopicChanged { group, topic } => println!("📝 [{group}] topic: {topic}"),
            Event::RolesChanged { group, roles } => println!("🛡️  [{group}] roles: {roles:?}"),
            Event::PresenceChanged { user, presence } => println!("💡 {user} is {presence:?}"),
            Event::ThreadUpdated { group, topic, members } => {
                println!("🧵 [{group}] \"{topic}\" with {} members", members.len());
            }
            Event::Error(e) => {
                client.disconnect().await;
                return Err(e.into());
            }
            other => println!("⚙️  {other:?}"),
        }
    }

    client.disconnect().await;
    println!("👋 Signed out");
    Ok(())
}

/// `None` when the credentials are incomplete.
fn config_from_env() -> Result<Option<Config>, String> {
    let Ok(username) = env::var("SKYPE_USERNAME") else { return Ok(None) };
    let credentials = match (env::var("SKYPE_PASSWORD"), env::var("SKYPE_TOKEN")) {
        (Ok(password), _) => Credentials::password(username, password),
        (_, Ok(token)) => Credentials::federated(username, token),
        _ => return Ok(None),
    };

    let mut config = Config { credentials, ..Default::default() };
    if let Ok(server) = env::var("SKYPE_SERVER") {
        let (host, port) = parse_target(&server)
            .ok_or_else(|| format!("SKYPE_SERVER must be host:port, got {server:?}"))?;
        config.server_host = host;
        config.server_port = port;
    }
    Ok(Some(config))
}
