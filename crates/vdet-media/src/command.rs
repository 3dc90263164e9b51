//! Child-process helpers shared by the decode and encode paths.

use tokio::io::AsyncReadExt;
use tokio::process::Child;

use crate::error::MediaResult;

/// Wait for a child to exit while draining its stderr.
///
/// The drain runs concurrently with the wait: a child blocked on a full
/// stderr pipe would otherwise never reach exit.
pub(crate) async fn wait_with_stderr(child: &mut Child) -> MediaResult<(std::process::ExitStatus, String)> {
    let drain = child.stderr.take().map(|mut err| {
        tokio::spawn(async move {
            let mut buf = String::new();
            err.read_to_string(&mut buf).await.ok();
            buf
        })
    });

    let status = child.wait().await?;
    let stderr = match drain {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    Ok((status, stderr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_exit_status_and_stderr_are_captured() {
        let mut child = Command::new("sh")
            .args(["-c", "echo oops 1>&2; exit 3"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let (status, stderr) = wait_with_stderr(&mut child).await.unwrap();
        assert_eq!(status.code(), Some(3));
        assert_eq!(stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_child_flooding_stderr_still_exits() {
        // Well past the pipe buffer; a sequential read-after-wait would
        // deadlock here.
        let mut child = Command::new("sh")
            .args(["-c", "yes e | head -c 300000 1>&2"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let (status, stderr) = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            wait_with_stderr(&mut child),
        )
        .await
        .expect("wait must not stall on a full stderr pipe")
        .unwrap();

        assert!(status.success());
        assert_eq!(stderr.len(), 300_000);
    }

    #[tokio::test]
    async fn test_unpiped_stderr_is_empty() {
        let mut child = Command::new("sh")
            .args(["-c", "true"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        let (status, stderr) = wait_with_stderr(&mut child).await.unwrap();
        assert!(status.success());
        assert!(stderr.is_empty());
    }
}
