use mock_target::MockTarget;

fn main() {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_owned());
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let _g = rt.enter();
    rt.block_on(run_server(&addr)).unwrap();
}

async fn run_server(addr: &str) -> anyhow::Result<()> {
    let target = MockTarget::bind(addr).await?;
    println!("mock target listening on http://{}", target.addr());
    target.join().await
}
