//! Run the delivery worker pool until Ctrl-C.

use courier_config::CourierConfig;
use courier_mail::{EMAIL_DELIVERY_TASK, EmailDeliveryHandler, TemplateRenderer};
use courier_queue::{Handlers, Worker};
use std::sync::Arc;
use tracing::info;

use crate::error::CliResult;
use crate::setup;

pub async fn run(config: &CourierConfig, concurrency: Option<usize>) -> CliResult<()> {
    let queue = setup::open_queue(config).await?;

    // Tasks left Processing by a previous run
    let recovered = queue.recover_stale().await?;
    if recovered > 0 {
        info!(recovered, "recovered stale tasks");
    }

    let renderer = TemplateRenderer::from_directory(&config.mail.template_dir)?;
    let transport = config.mail.transport.build();
    let handler = EmailDeliveryHandler::new(Arc::new(renderer), transport)
        .with_default_smtp(setup::smtp_config(&config.smtp));

    let mut worker_config = setup::worker_config(&config.worker);
    if let Some(concurrency) = concurrency {
        worker_config.concurrency = concurrency.max(1);
    }

    let mut worker = Worker::with_config(queue, worker_config);
    worker.start(Handlers::new().register(EMAIL_DELIVERY_TASK, Arc::new(handler)))?;
    info!(
        concurrency = worker.config().concurrency,
        smtp = %setup::smtp_config(&config.smtp).address(),
        "courier worker running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    let report = worker.stop().await?;
    info!(
        drained = report.drained,
        abandoned = report.abandoned,
        "courier worker stopped"
    );
    Ok(())
}
