use anyhow::Result;
use futures::future::{select_all, BoxFuture};
use tracing::info;

/// A named source of shutdown requests.
pub type SignalSource = (&'static str, BoxFuture<'static, Option<()>>);

/// Register SIGINT, SIGTERM, SIGQUIT and SIGABRT handlers.
#[cfg(unix)]
pub fn register_signals() -> Result<Vec<SignalSource>> {
    use anyhow::Context;
    use tokio::signal::unix::{signal, SignalKind};

    let kinds = [
        ("SIGINT", SignalKind::interrupt()),
        ("SIGTERM", SignalKind::terminate()),
        ("SIGQUIT", SignalKind::quit()),
        ("SIGABRT", SignalKind::from_raw(libc::SIGABRT)),
    ];

    let mut sources: Vec<SignalSource> = Vec::with_capacity(kinds.len());
    for (name, kind) in kinds {
        let mut stream =
            signal(kind).with_context(|| format!("Failed to register {} handler", name))?;
        let fired: BoxFuture<'static, Option<()>> = Box::pin(async move { stream.recv().await });
        sources.push((name, fired));
    }
    Ok(sources)
}

#[cfg(not(unix))]
pub fn register_signals() -> Result<Vec<SignalSource>> {
    let fired: BoxFuture<'static, Option<()>> =
        Box::pin(async { tokio::signal::ctrl_c().await.ok() });
    Ok(vec![("Ctrl-C", fired)])
}

/// Resolve with the name of the first source that fires.
pub async fn first_signal(sources: Vec<SignalSource>) -> &'static str {
    let (names, waits): (Vec<_>, Vec<_>) = sources.into_iter().unzip();
    if waits.is_empty() {
        return std::future::pending().await;
    }

    let (_, index, _) = select_all(waits).await;
    let name = names[index];
    info!("Got signal: {}", name);
    name
}

/// Wait for the process to be asked to stop and return the signal name.
pub async fn wait_for_signal() -> Result<&'static str> {
    let sources = register_signals()?;
    Ok(first_signal(sources).await)
}
