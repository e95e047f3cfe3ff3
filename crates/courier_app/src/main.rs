#[tokio::main]
async fn main() {
    if lib_courier::init().await.is_err() {
        std::process::exit(1);
    }
}
