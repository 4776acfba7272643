use std::path::Path;

use egads_server::{Client, ProtocolError};

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("egads: tokio runtime: {e}");
            std::process::exit(1);
        }
    }
}

fn exit_on<T>(socket: &Path, result: Result<T, ProtocolError>) -> T {
    result.unwrap_or_else(|e| {
        eprintln!("egads: {}: {e}", socket.display());
        std::process::exit(1);
    })
}

pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// Read `bytes` bytes from the daemon and write them to stdout.
pub fn fetch(socket: &Path, bytes: u32, as_hex: bool) {
    let data = exit_on(
        socket,
        runtime().block_on(async {
            let mut client = Client::connect(socket).await?;
            client.fetch(bytes).await
        }),
    );
    if as_hex {
        println!("{}", hex(&data));
    } else {
        use std::io::Write;
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(&data).and_then(|_| out.flush()) {
            eprintln!("egads: stdout: {e}");
            std::process::exit(1);
        }
    }
}

pub fn level(socket: &Path, egd: bool, json: bool) {
    let bits = exit_on(
        socket,
        runtime().block_on(async {
            let mut client = Client::connect(socket).await?;
            if egd {
                client.egd_level().await
            } else {
                client.level().await
            }
        }),
    );
    if json {
        println!("{}", serde_json::json!({ "bits": bits, "level": bits as f64 / 64.0 }));
    } else {
        println!("{bits} bits ({:.2})", bits as f64 / 64.0);
    }
}

/// Submit `data` (or stdin if empty) through the EGD interface.
pub fn add(socket: &Path, bits: u16, data: Option<&str>) {
    let payload = match data {
        Some(s) => s.as_bytes().to_vec(),
        None => {
            use std::io::Read;
            let mut buf = Vec::new();
            if let Err(e) = std::io::stdin().read_to_end(&mut buf) {
                eprintln!("egads: stdin: {e}");
                std::process::exit(1);
            }
            buf
        }
    };
    exit_on(
        socket,
        runtime().block_on(async {
            let mut client = Client::connect(socket).await?;
            client.egd_add(bits, &payload).await
        }),
    );
    println!("submitted {} bytes credited with {bits} bits", payload.len());
}

pub fn pid(socket: &Path) {
    let pid = exit_on(
        socket,
        runtime().block_on(async {
            let mut client = Client::connect(socket).await?;
            client.egd_pid().await
        }),
    );
    println!("{pid}");
}
