#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use clap::{App, Arg};
use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;

fn main() {
    env_logger::init();

    let matches = App::new("sender")
        .version(crate_version!())
        .about("Sends test sensor datagrams to a listener")
        .arg(
            Arg::with_name("destination")
                .short("d")
                .long("destination")
                .takes_value(true)
                .default_value("127.0.0.1:5005")
                .help("host:port pair to send to"),
        )
        .arg(
            Arg::with_name("count")
                .short("c")
                .long("count")
                .takes_value(true)
                .default_value("1")
                .help("How many datagrams to send"),
        )
        .arg(
            Arg::with_name("interval")
                .short("i")
                .long("interval")
                .takes_value(true)
                .default_value("0")
                .help("Pause between sends in milliseconds"),
        )
        .arg(
            Arg::with_name("message")
                .index(1)
                .default_value("hello")
                .help("Payload to send, as text"),
        )
        .get_matches();

    let destination: SocketAddr = value_t!(matches, "destination", String)
        .unwrap_or_else(|e| e.exit())
        .parse()
        .expect("Invalid host:port pair");
    let count = value_t!(matches, "count", u64).unwrap_or_else(|e| e.exit());
    let interval = value_t!(matches, "interval", u64).unwrap_or_else(|e| e.exit());
    let message = value_t!(matches, "message", String).unwrap_or_else(|e| e.exit());

    let socket = UdpSocket::bind("0.0.0.0:0").expect("Can't bind");
    println!("Sending {} datagrams to {}", count, destination);
    for i in 0..count {
        if i > 0 && interval > 0 {
            thread::sleep(Duration::from_millis(interval));
        }
        let sent = socket
            .send_to(message.as_bytes(), destination)
            .expect("Sending failed!");
        debug!("sent {} bytes to {}", sent, destination);
    }
}
