#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::sync::oneshot;

use admctrl_core::protocol::{ArgValue, AuthResult, FunctionCall, Verdict, RESULT_SIZE};
use admctrl_core::ErrorCode;
use admctrl_daemon::app_state::AppState;
use admctrl_daemon::config;
use admctrl_daemon::transport::{self, codec::write_frame};

use test_keys::alice;

async fn connect(path: &std::path::Path) -> UnixStream {
    for _ in 0..100 {
        if let Ok(s) = UnixStream::connect(path).await {
            return s;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("daemon never listened on {}", path.display());
}

async fn roundtrip(stream: &mut UnixStream, request: &[u8]) -> AuthResult {
    write_frame(stream, request).await.unwrap();
    let mut buf = vec![0u8; RESULT_SIZE];
    stream.read_exact(&mut buf).await.unwrap();
    AuthResult::decode(Bytes::from(buf)).unwrap()
}

#[tokio::test]
async fn serves_decisions_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("authd.sock");

    let mut cfg = config::load_from_str("version: 1\n").unwrap();
    cfg.daemon.socket = socket.clone();
    let policy = format!(
        "Authorizer: POLICY\nLicensees: \"{}\"\nConditions: sample.num <= 1\n",
        alice().public
    );
    let state = AppState::with_policy(cfg, &policy).await.unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(transport::serve(state, async {
        let _ = stopped.await;
    }));

    let mut stream = connect(&socket).await;
    let call = FunctionCall::new("sample", "libsampling").arg(ArgValue::Int32(3));

    let granted = alice().request(1, "", &[call.clone()]).encode().unwrap();
    let r = roundtrip(&mut stream, &granted).await;
    assert_eq!(r.verdict, Verdict::Compliant);

    // several requests share one connection
    let denied = alice().request(2, "", &[call.clone(), call]).encode().unwrap();
    let r = roundtrip(&mut stream, &denied).await;
    assert_eq!(r.verdict, Verdict::NonCompliant);
    assert_eq!(r.error, None);

    // nonce differs from the one that was signed
    let mut forged = alice().request(3, "", &[]);
    forged.nonce = 4;
    let r = roundtrip(&mut stream, &forged.encode().unwrap()).await;
    assert_eq!(r.error, Some(ErrorCode::Authentication));
    drop(stream);

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(!socket.exists());
}

#[tokio::test]
async fn bad_frame_length_drops_the_connection() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("authd.sock");

    let mut cfg = config::load_from_str("version: 1\n").unwrap();
    cfg.daemon.socket = socket.clone();
    let state = AppState::with_policy(cfg, "Authorizer: POLICY\nLicensees: *\n").await.unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(transport::serve(state, async {
        let _ = stopped.await;
    }));

    let mut stream = connect(&socket).await;
    write_frame(&mut stream, &[0u8; 16]).await.unwrap();
    let mut buf = Vec::new();
    let n = stream.read_to_end(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
