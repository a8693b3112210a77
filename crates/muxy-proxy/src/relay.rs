//! Bidirectional byte relay between client and backend.
//!
//! `head_bytes` must reach the backend before any further client bytes;
//! the caller writes `head_bytes` and awaits it before calling
//! [`relay`], so the client→server copy only ever sees bytes read
//! after that write completes.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Run the client→server and server→client copies concurrently. As
/// soon as either direction ends (EOF or a read/write error), both
/// streams are shut down immediately and this function returns — the
/// other direction is abandoned rather than left to run to its own
/// EOF, mirroring the Go original's `initiateCopy`, which `defer`s
/// closing both connections around each one-way `io.Copy`.
///
/// Returns `(bytes_from_client, bytes_from_server)`, counted up to the
/// point either direction stopped.
pub async fn relay<C, S>(client: &mut C, server: &mut S) -> std::io::Result<(u64, u64)>
where
    C: AsyncRead + AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (client_r, mut client_w) = tokio::io::split(client);
    let (server_r, mut server_w) = tokio::io::split(server);

    let client_to_server_count = AtomicU64::new(0);
    let server_to_client_count = AtomicU64::new(0);

    let client_to_server = copy_counted(client_r, &mut server_w, &client_to_server_count);
    let server_to_client = copy_counted(server_r, &mut client_w, &server_to_client_count);
    tokio::pin!(client_to_server, server_to_client);

    tokio::select! {
        _ = &mut client_to_server => {}
        _ = &mut server_to_client => {}
    }

    let _ = client_w.shutdown().await;
    let _ = server_w.shutdown().await;

    Ok((
        client_to_server_count.load(Ordering::Relaxed),
        server_to_client_count.load(Ordering::Relaxed),
    ))
}

/// One-way copy loop that records bytes moved in `counter` as it goes,
/// so a count survives even if this future is dropped mid-copy by the
/// `select!` in [`relay`] (the sibling direction never runs to
/// completion once the other side finishes first).
async fn copy_counted<R, W>(mut reader: R, writer: &mut W, counter: &AtomicU64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}
