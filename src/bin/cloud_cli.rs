use clap::Parser;

use scratch_cloud::{ClientConfig, CloudClient, Source};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "SCRATCH_USERNAME")]
    username: String,

    #[arg(long, env = "SCRATCH_PASSWORD")]
    password: String,

    #[arg(long)]
    project_id: String,

    #[arg(long, default_value_t = 10)]
    connections: usize,

    /// Variable to watch and echo-increment as a smoke test.
    #[arg(long, default_value = "counter")]
    variable: String,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::init();
    let args = Args::parse();

    println!("[MAIN] Connecting to project {}...", args.project_id);
    let config = ClientConfig::default()
        .with_connections(args.connections)
        .with_default_listen_mode(Source::Transport);
    let client = CloudClient::connect(args.username, args.password, args.project_id, config).await;

    while !client.login_successful() {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
    println!("[MAIN] Logged in.");

    let watched = args.variable.clone();
    let echo_client = client.clone();
    client.on_variable_set(Box::new(move |event| {
        if event.name != watched {
            return;
        }
        println!(
            "[MAIN] {} = {} (source={}, user={})",
            event.name,
            event.value,
            event.source,
            event.user()
        );
        let next: i64 = event.value.parse().unwrap_or(0) + 1;
        let echo_client = echo_client.clone();
        let name = event.name.clone();
        tokio::spawn(async move {
            echo_client.set_variable(&name, &next.to_string()).await;
        });
    }));

    println!("[MAIN] Watching '{}'. Press Ctrl+C to exit.", args.variable);
    tokio::signal::ctrl_c().await.ok();
    client.shutdown().await;
}
