// netc-example-client: example binary using the connection client
// Opens a TCP connection to host:port, sends a message and prints the reply.
use netc_ng::ConnectionClient;
use std::env;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

fn usage() {
    println!("Usage: netc-example-client [options] host port");
    println!("Open a TCP connection, send a message and print the reply.");
    println!("Options:");
    println!("  -m message    Message to send (Default: ping)");
    println!("  -t timeout    Connect timeout in milliseconds (Default: 3000)");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    let mut message = String::from("ping");
    let mut timeout = 3000;
    let mut positional: Vec<String> = Vec::new();

    // Parse arguments
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-m" => {
                if i + 1 < args.len() {
                    message = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "-t" => {
                if i + 1 < args.len() {
                    timeout = args[i + 1].parse().unwrap_or(3000);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "-h" | "--help" => {
                usage();
                return;
            }
            _ => {
                positional.push(args[i].clone());
                i += 1;
            }
        }
    }

    if positional.len() != 2 {
        eprintln!("ERROR: host and port required");
        usage();
        process::exit(1);
    }
    let host = &positional[0];
    let port: u16 = match positional[1].parse() {
        Ok(p) => p,
        Err(_) => {
            eprintln!("ERROR: invalid port: {}", positional[1]);
            process::exit(1);
        }
    };

    let mut client = ConnectionClient::new();
    if let Err(e) = client.connect_host_timeout(host, port, timeout) {
        eprintln!("ERROR: connect to {}:{} failed: {}", host, port, e);
        process::exit(1);
    }
    println!(
        "Connected to {}:{} (local {}:{})",
        client.remote_ip(),
        client.remote_port(),
        client.local_ip(),
        client.local_port()
    );

    let sent = client.write(message.as_bytes());
    println!("Sent {} of {} bytes", sent, message.len());
    if client.write_error() {
        eprintln!("WARNING: write error flagged");
    }

    // Wait up to two seconds for a reply
    let deadline = Instant::now() + Duration::from_secs(2);
    while client.available() == 0 && client.connected() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }

    let mut buf = [0u8; 1024];
    let n = client.read(&mut buf);
    if n > 0 {
        println!(
            "Received {} bytes: {}",
            n,
            String::from_utf8_lossy(&buf[..n as usize])
        );
    } else {
        println!("No reply received");
    }

    client.stop();
}
