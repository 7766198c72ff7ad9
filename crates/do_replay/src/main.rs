#[tokio::main]
async fn main() {
    if let Err(e) = do_replay::init().await {
        eprintln!("do-replay: {e}");
        std::process::exit(1);
    }
}
