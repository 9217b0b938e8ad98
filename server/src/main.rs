use dotenvy::dotenv;

#[tokio::main]
async fn main() {
    dotenv().ok();

    if let Err(err) = buspass_server::cli::run().await {
        eprintln!("buspass-server: {err}");
        std::process::exit(1);
    }
}
