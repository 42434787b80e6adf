use std::{io, rc::Rc};
use tickstream::{ServerConfig, StreamHandler, TokioTimers, rt};
use tokio::{net::TcpListener, runtime::Builder, task::LocalSet};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = ServerConfig::from_env()?;

    let runtime = Builder::new_current_thread().enable_all().build()?;
    LocalSet::new().block_on(&runtime, run(config))?;
    Ok(())
}

async fn run(config: ServerConfig) -> io::Result<()> {
    let tcp = TcpListener::bind(config.addr()).await?;
    log::info!("streaming {} at http://{}", config.location(), tcp.local_addr()?);

    let handler = StreamHandler::new(config.stream().clone(), Rc::new(TokioTimers::new()));
    rt::serve(tcp, config.location(), handler).await;
    Ok(())
}
