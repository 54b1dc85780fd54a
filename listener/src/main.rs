#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use clap::{App, Arg};
use netlisten::{AppConfig, Listener, DEFAULT_ADDRESS, DEFAULT_PORT};
use std::io;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    env_logger::init();

    // clap wants string defaults; render them from the library constants.
    let address_default = DEFAULT_ADDRESS.to_string();
    let port_default = DEFAULT_PORT.to_string();
    let matches = App::new("listener")
        .version(crate_version!())
        .about("Prints sensor datagrams arriving over UDP")
        .arg(
            Arg::with_name("address")
                .short("a")
                .long("address")
                .takes_value(true)
                .default_value(&address_default)
                .help("IPv4 address to listen on"),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .takes_value(true)
                .default_value(&port_default)
                .help("UDP port to listen on"),
        )
        .get_matches();
    let config = AppConfig::parse(&matches);

    // Ctrl-C flips the flag; the receive loop notices and returns cleanly.
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || handler_stop.store(true, Ordering::SeqCst))
        .expect("Error setting Ctrl-C handler");

    let mut listener = match Listener::bind(&config) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    debug!("serving on {}", listener.local_addr());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = listener.run(&mut out, &stop) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
