//! SBD Field Test Tool
//!
//! Sends a message through an attached Iridium modem and reports whatever
//! the gateway had queued for us. Useful for antenna placement tests.
//!
//! Usage:
//!   cargo run --example sbd_send -- [OPTIONS] [MESSAGE]
//!
//! Options:
//!   --port PORT       Serial port (default: /dev/ttyUSB0)
//!   --baud RATE       Baud rate (default: 19200)
//!   --attempts N      Max send attempts (default: 5)
//!   --check           Mailbox check only, send nothing
//!   --debug           Print the AT dialog

use rocklink_core::protocol::{DriverConfig, SbdModem};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut config = DriverConfig {
        port: "/dev/ttyUSB0".to_string(),
        ..DriverConfig::default()
    };
    let mut message = String::new();
    let mut check_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                if i < args.len() {
                    config.port = args[i].clone();
                }
            }
            "--baud" | "-b" => {
                i += 1;
                if i < args.len() {
                    config.baud_rate = args[i].parse().unwrap_or(19200);
                }
            }
            "--attempts" | "-a" => {
                i += 1;
                if i < args.len() {
                    config.max_attempts = args[i].parse().unwrap_or(5);
                }
            }
            "--check" => {
                check_only = true;
            }
            "--debug" => {
                config.debug = true;
            }
            "--help" | "-h" => {
                print_help();
                return;
            }
            arg if !arg.starts_with('-') => {
                message = arg.to_string();
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
            }
        }
        i += 1;
    }

    println!("Port: {} @ {} baud", config.port, config.baud_rate);

    let mut modem = SbdModem::new(config);
    modem.on_ring_alert(|| println!("  ring alert from the gateway"));
    modem.on_new_message(|payload, queued| {
        println!(
            "  received {} bytes ({} more queued): {:?}",
            payload.len(),
            queued,
            String::from_utf8_lossy(payload)
        );
    });

    if let Err(e) = modem.open() {
        eprintln!("Failed to open modem: {}", e);
        return;
    }
    println!("Modem initialized");

    match modem.get_signal_quality() {
        Ok(bars) => println!("Signal: {}/5 bars", bars),
        Err(e) => println!("Signal check failed: {}", e),
    }

    let result = if check_only {
        println!("Checking mailbox...");
        modem.mailbox_check()
    } else {
        println!("Sending {:?}...", message);
        modem.send_message(&message)
    };

    match result {
        Ok(momsn) => println!("Session complete, MOMSN {}", momsn),
        Err(e) => eprintln!("Session failed: {}", e),
    }
}

fn print_help() {
    println!("SBD Field Test Tool");
    println!();
    println!("Usage: sbd_send [OPTIONS] [MESSAGE]");
    println!();
    println!("Options:");
    println!("  --port, -p PORT     Serial port (default: /dev/ttyUSB0)");
    println!("  --baud, -b RATE     Baud rate (default: 19200)");
    println!("  --attempts, -a N    Max send attempts (default: 5)");
    println!("  --check             Mailbox check only, send nothing");
    println!("  --debug             Print the AT dialog");
    println!("  --help, -h          Show this help");
}
