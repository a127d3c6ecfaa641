use futures::future::join_all;
use log::{debug, warn};
use mcsm_protocol::event::{EventKind, LogOrigin, Severity};
use mcsm_protocol::utils::Encoding;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::select;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::management::instance::ServerInstance;
use crate::management::launch::{LaunchCommand, ResolvedLaunch};
use crate::pipeline::{EventBus, LineSource};
use crate::utils::StopSignal;

/// Spawns the server with all three standard streams piped.
pub fn spawn(command: &LaunchCommand, resolved: &ResolvedLaunch) -> std::io::Result<Child> {
    let mut cmd = Command::new(&resolved.runtime);
    cmd.args(resolved.arguments(command))
        .current_dir(&resolved.working_dir)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    if let Some(path) = resolved.search_path() {
        cmd.env("PATH", path);
    }

    cmd.spawn()
}

/// Hands the child's streams to the instance and starts its background tasks:
/// one reader per output stream and the exit monitor that owns the child.
pub async fn attach(mut child: Child, instance: Arc<ServerInstance>) {
    instance.attach_stdin(child.stdin.take()).await;

    let encoding = instance.command().output_encoding;
    let mut readers = vec![];
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(
            stdout,
            encoding,
            instance.bus().clone(),
            instance.id(),
            Severity::Info,
            instance.readers_stop(),
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(
            stderr,
            encoding,
            instance.bus().clone(),
            instance.id(),
            Severity::Warn,
            instance.readers_stop(),
        ));
    }

    tokio::spawn(monitor_exit(child, instance, readers));
}

fn spawn_reader<R>(
    stream: R,
    encoding: Encoding,
    bus: EventBus,
    instance: Uuid,
    severity: Severity,
    stop: StopSignal,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut source = LineSource::new(stream, encoding, stop);
        while let Some(line) = source.next_line().await {
            bus.console_line(instance, severity, line).await;
        }
        debug!("output reader of {} finished", instance);
    })
}

async fn monitor_exit(mut child: Child, instance: Arc<ServerInstance>, readers: Vec<JoinHandle<()>>) {
    let kill = instance.kill_signal();
    let status = select! {
        status = child.wait() => status,
        _ = kill.raised() => {
            if let Err(err) = child.start_kill() {
                warn!("could not kill server process (pid={:?}): {}", instance.pid(), err);
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            warn!("could not collect exit status of {}: {}", instance.name(), err);
            None
        }
    };
    instance.release_stdin().await;
    instance.mark_exited(code);

    // let the readers reach EOF so the last console lines precede the exit event
    let drain = instance.config().reader_drain();
    if tokio::time::timeout(drain, join_all(readers)).await.is_err() {
        debug!("output readers of {} still open after exit", instance.name());
    }
    instance.readers_stop().raise();

    let text = match code {
        Some(code) => format!("server process exited with code {}", code),
        None => "server process was terminated".to_owned(),
    };
    let severity = match code {
        Some(0) => Severity::Info,
        _ => Severity::Warn,
    };
    instance
        .bus()
        .publish(
            Some(instance.id()),
            LogOrigin::Daemon,
            severity,
            EventKind::Exited { code },
            text,
        )
        .await;
}
