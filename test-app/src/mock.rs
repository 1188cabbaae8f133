// Scripted in-process codec for `--mock`.
//
// Lets the CLI be exercised end to end without hardware: the mock answers
// `ATI` with an identification banner, reports a few parameters in
// reply to the status battery, and raises a call.

use anyhow::{Context, Result};
use aarc_test_harness::MockCodecServer;

/// Start a scripted codec on a loopback port and return it with its port.
pub async fn start() -> Result<(MockCodecServer, u16)> {
    let mut server = MockCodecServer::new()
        .await
        .context("failed to bind mock codec")?;

    server.expect("ATI", "SCOOP 5 IP mock\r\nOK\r\n");
    server.expect("AT#PWD=", "OK\r\n");
    server.expect(
        "AT&V",
        "#COD1=7\r\n#NET=1\r\n#CHD1=256\r\n#SYNC=0\r\n#AES=1\r\nOK\r\n",
    );
    server.expect("AT#SUP", "COD1:S=11\r\nENT:APPEL1=1\r\nN1=0612345678\r\nOK\r\n");
    server.expect("AT&V0", "CFG=2\r\nBOU=0\r\nALA:D1=0,D2=0,D3=1\r\n$ESTABLISHED_1\r\nOK\r\n");
    server.start();

    let port = server.port();
    Ok((server, port))
}
