use anyhow::Result;
use answer_prober::utils::logging;
use answer_prober::{Config, SequencerServer};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置（监听地址来自 SEQUENCER_LISTEN）
    let config = Config::load()?;

    let server =
        SequencerServer::bind(&config.sequencer_listen, config.sequencer_frame_timeout()).await?;
    server.serve().await?;

    Ok(())
}
