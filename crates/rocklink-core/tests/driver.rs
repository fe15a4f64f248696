//! End-to-end driver tests against a scripted modem.
//!
//! The mock channel pairs every expected write with the bytes the modem
//! would answer, so a whole SBD session (including the binary SBDRB frame)
//! can run without hardware. Any write the script does not expect panics
//! the test, which doubles as proof that no extra commands were issued.

use rocklink_core::protocol::{
    DriverConfig, DriverError, MessagePending, ModemChannel, SbdModem,
};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

struct Step {
    expect: Vec<u8>,
    respond: Vec<u8>,
}

fn step(expect: &[u8], respond: &[u8]) -> Step {
    Step {
        expect: expect.to_vec(),
        respond: respond.to_vec(),
    }
}

#[derive(Default)]
struct ScriptInner {
    steps: VecDeque<Step>,
    written: Vec<u8>,
    inbound: VecDeque<u8>,
}

#[derive(Clone)]
struct ScriptHandle(Arc<Mutex<ScriptInner>>);

impl ScriptHandle {
    fn inject(&self, bytes: &[u8]) {
        self.0.lock().unwrap().inbound.extend(bytes.iter().copied());
    }

    fn assert_done(&self) {
        let inner = self.0.lock().unwrap();
        assert!(
            inner.steps.is_empty(),
            "{} scripted step(s) never ran",
            inner.steps.len()
        );
    }
}

struct ScriptedChannel(Arc<Mutex<ScriptInner>>);

impl Read for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.0.lock().unwrap();
        if inner.inbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(inner.inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inner.inbound.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for ScriptedChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.lock().unwrap();
        inner.written.extend_from_slice(buf);
        loop {
            let expect = match inner.steps.front() {
                Some(s) => s.expect.clone(),
                None => {
                    assert!(
                        inner.written.is_empty(),
                        "unexpected write with empty script: {:?}",
                        String::from_utf8_lossy(&inner.written)
                    );
                    break;
                }
            };
            if inner.written.len() < expect.len() {
                assert!(
                    expect.starts_with(&inner.written),
                    "write mismatch: got {:?}, script expects {:?}",
                    String::from_utf8_lossy(&inner.written),
                    String::from_utf8_lossy(&expect)
                );
                break;
            }
            assert!(
                inner.written.starts_with(&expect),
                "write mismatch: got {:?}, script expects {:?}",
                String::from_utf8_lossy(&inner.written),
                String::from_utf8_lossy(&expect)
            );
            inner.written.drain(..expect.len());
            let respond = inner.steps.pop_front().unwrap().respond;
            inner.inbound.extend(respond);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ModemChannel for ScriptedChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.0.lock().unwrap().inbound.len() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.0.lock().unwrap().inbound.clear();
        Ok(())
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn init_steps() -> Vec<Step> {
    vec![
        step(b"ATE0\r", b"OK\r\n"),
        step(b"AT+SBDD2\r", b"0\r\nOK\r\n"),
        step(b"AT+SBDAREG=1\r", b"OK\r\n"),
        step(b"AT+SBDMTA=1\r", b"OK\r\n"),
    ]
}

fn fast_config() -> DriverConfig {
    DriverConfig {
        default_timeout_ms: 2_000,
        simple_timeout_ms: 500,
        max_wait_ms: Some(2_000),
        retry_delay_ms: 1,
        drain_delay_ms: 1,
        ..DriverConfig::default()
    }
}

fn open_modem(config: DriverConfig, steps: Vec<Step>) -> (SbdModem, ScriptHandle) {
    let inner = Arc::new(Mutex::new(ScriptInner {
        steps: steps.into(),
        ..ScriptInner::default()
    }));
    let handle = ScriptHandle(Arc::clone(&inner));
    let mut modem = SbdModem::new(config);
    modem
        .open_with(Box::new(ScriptedChannel(inner)))
        .expect("init should succeed");
    (modem, handle)
}

#[test]
fn test_init_happy_path_fires_initialized_once() {
    let inner = Arc::new(Mutex::new(ScriptInner {
        steps: init_steps().into(),
        ..ScriptInner::default()
    }));
    let handle = ScriptHandle(Arc::clone(&inner));

    let fired = Arc::new(Mutex::new(0u32));
    let mut modem = SbdModem::new(fast_config());
    {
        let fired = Arc::clone(&fired);
        modem.on_initialized(move || *fired.lock().unwrap() += 1);
    }
    modem
        .open_with(Box::new(ScriptedChannel(inner)))
        .expect("init should succeed");

    assert_eq!(*fired.lock().unwrap(), 1);
    assert!(modem.is_open());
    handle.assert_done();
}

#[test]
fn test_init_failure_aborts_without_event() {
    let inner = Arc::new(Mutex::new(ScriptInner {
        steps: vec![
            step(b"ATE0\r", b"OK\r\n"),
            step(b"AT+SBDD2\r", b"ERROR\r\n"),
        ]
        .into(),
        ..ScriptInner::default()
    }));

    let fired = Arc::new(Mutex::new(0u32));
    let mut modem = SbdModem::new(fast_config());
    {
        let fired = Arc::clone(&fired);
        modem.on_initialized(move || *fired.lock().unwrap() += 1);
    }
    let result = modem.open_with(Box::new(ScriptedChannel(inner)));

    assert!(matches!(result, Err(DriverError::ModemError(_))));
    assert_eq!(*fired.lock().unwrap(), 0);
    assert!(!modem.is_open());
    assert!(matches!(
        modem.send_message("nope"),
        Err(DriverError::NotConnected)
    ));
}

#[test]
fn test_text_send_no_mt() {
    let mut steps = init_steps();
    steps.extend([
        step(b"AT+SBDWT=hider\r", b"OK\r\n"),
        step(b"AT+CIER=1,1,0\r", b"OK\r\n+CIEV:0,2\r\n"),
        step(b"AT+CIER=0,0,0\r", b"OK\r\n"),
        step(b"AT+SBDIXA\r", b"+SBDIX: 1, 42, 0, 0, 0, 0\r\n\r\nOK\r\n"),
        step(b"AT+SBDD0\r", b"0\r\nOK\r\n"),
    ]);
    let (mut modem, handle) = open_modem(fast_config(), steps);

    let momsn = modem.send_message("hider").expect("send should succeed");
    assert_eq!(momsn, 42);
    assert_eq!(modem.message_pending(), MessagePending::None);
    assert_eq!(modem.queued_messages(), 0);
    handle.assert_done();
}

#[test]
fn test_binary_send_with_mt_delivery_and_drain() {
    // 0xDE + 0xAD + 0xBE + 0xEF = 0x0338; 0xAB + 0xCD = 0x0178
    let mut steps = init_steps();
    steps.extend([
        step(b"AT+SBDWB=3\r", b"READY\r\n"),
        step(&[0x01, 0x02, 0x03, 0x00, 0x06], b"0\r\nOK\r\n"),
        step(b"AT+CIER=1,1,0\r", b"OK\r\n+CIEV:0,3\r\n"),
        step(b"AT+CIER=0,0,0\r", b"OK\r\n"),
        step(b"AT+SBDIXA\r", b"+SBDIX: 2, 43, 1, 7, 4, 2\r\n\r\nOK\r\n"),
        step(
            b"AT+SBDRB\r",
            &[0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF, 0x03, 0x38],
        ),
        step(b"AT+SBDD1\r", b"0\r\nOK\r\n"),
        step(b"AT+SBDD0\r", b"0\r\nOK\r\n"),
        // Two messages were queued; the follow-up check drains the second
        step(b"AT+SBDD0\r", b"0\r\nOK\r\n"),
        step(b"AT+CIER=1,1,0\r", b"OK\r\n+CIEV:0,3\r\n"),
        step(b"AT+CIER=0,0,0\r", b"OK\r\n"),
        step(b"AT+SBDIXA\r", b"+SBDIX: 0, 44, 1, 8, 2, 0\r\n\r\nOK\r\n"),
        step(b"AT+SBDRB\r", &[0x00, 0x02, 0xAB, 0xCD, 0x01, 0x78]),
        step(b"AT+SBDD1\r", b"0\r\nOK\r\n"),
        step(b"AT+SBDD0\r", b"0\r\nOK\r\n"),
    ]);

    let received: Arc<Mutex<Vec<(Vec<u8>, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let (mut modem, handle) = {
        let inner = Arc::new(Mutex::new(ScriptInner {
            steps: steps.into(),
            ..ScriptInner::default()
        }));
        let handle = ScriptHandle(Arc::clone(&inner));
        let mut modem = SbdModem::new(fast_config());
        {
            let received = Arc::clone(&received);
            modem.on_new_message(move |payload, queued| {
                received.lock().unwrap().push((payload.to_vec(), queued));
            });
        }
        modem
            .open_with(Box::new(ScriptedChannel(inner)))
            .expect("init should succeed");
        (modem, handle)
    };

    let momsn = modem
        .send_binary_message(&[0x01, 0x02, 0x03])
        .expect("send should succeed");

    assert_eq!(momsn, 43);
    let received = received.lock().unwrap();
    assert_eq!(
        *received,
        vec![
            (vec![0xDE, 0xAD, 0xBE, 0xEF], 2),
            (vec![0xAB, 0xCD], 0),
        ]
    );
    assert_eq!(modem.queued_messages(), 0);
    handle.assert_done();
}

#[test]
fn test_ring_alert_while_idle_issues_no_commands() {
    let (mut modem, handle) = open_modem(fast_config(), init_steps());

    let rings = Arc::new(Mutex::new(0u32));
    {
        let rings = Arc::clone(&rings);
        modem.on_ring_alert(move || *rings.lock().unwrap() += 1);
    }

    handle.inject(b"SBDRING\r\n");
    modem.poll().expect("poll should succeed");

    assert_eq!(*rings.lock().unwrap(), 1);
    // An empty script panics on any write, so reaching here proves the
    // driver sent nothing in response to the ring
    handle.assert_done();
}

#[test]
fn test_sbdix_failures_retry_up_to_max_attempts() {
    let config = DriverConfig {
        max_attempts: 2,
        ..fast_config()
    };
    let mut steps = init_steps();
    for mo_status in [18u32, 32] {
        steps.extend([
            step(b"AT+SBDWT=ping\r", b"OK\r\n"),
            step(b"AT+CIER=1,1,0\r", b"OK\r\n+CIEV:0,4\r\n"),
            step(b"AT+CIER=0,0,0\r", b"OK\r\n"),
            Step {
                expect: b"AT+SBDIXA\r".to_vec(),
                respond: format!("+SBDIX: {}, 0, 0, 0, 0, 0\r\n\r\nOK\r\n", mo_status)
                    .into_bytes(),
            },
            // Failure clears the MO buffer before the next attempt
            step(b"AT+SBDD0\r", b"0\r\nOK\r\n"),
        ]);
    }
    let (mut modem, handle) = open_modem(config, steps);

    let result = modem.send_message("ping");
    assert!(matches!(result, Err(DriverError::MaxAttemptsExceeded(2))));
    // The script held exactly two SBDIX dialogs; a third attempt would
    // have tripped the unexpected-write panic
    handle.assert_done();
}

#[test]
fn test_two_mailbox_checks_run_exactly_two_sessions() {
    let mut steps = init_steps();
    for momsn in [7, 8] {
        steps.extend([
            step(b"AT+SBDD0\r", b"0\r\nOK\r\n"),
            step(b"AT+CIER=1,1,0\r", b"OK\r\n+CIEV:0,5\r\n"),
            step(b"AT+CIER=0,0,0\r", b"OK\r\n"),
            Step {
                expect: b"AT+SBDIXA\r".to_vec(),
                respond: format!("+SBDIX: 0, {}, 0, 0, 0, 0\r\n\r\nOK\r\n", momsn).into_bytes(),
            },
            step(b"AT+SBDD0\r", b"0\r\nOK\r\n"),
        ]);
    }
    let (mut modem, handle) = open_modem(fast_config(), steps);

    assert_eq!(modem.mailbox_check().unwrap(), 7);
    assert_eq!(modem.mailbox_check().unwrap(), 8);
    handle.assert_done();
}

#[test]
fn test_silent_modem_times_out_instead_of_hanging() {
    let config = DriverConfig {
        max_attempts: 1,
        default_timeout_ms: 50,
        ..fast_config()
    };
    let mut steps = init_steps();
    steps.extend([
        // Modem goes quiet after accepting the write
        step(b"AT+SBDWT=hi\r", b""),
        // The failed attempt still clears the MO buffer
        step(b"AT+SBDD0\r", b"0\r\nOK\r\n"),
    ]);
    let (mut modem, handle) = open_modem(config, steps);

    let result = modem.send_message("hi");
    assert!(matches!(result, Err(DriverError::MaxAttemptsExceeded(1))));
    handle.assert_done();
}

#[test]
fn test_debug_events_mirror_unsolicited_traffic() {
    let config = DriverConfig {
        debug: true,
        ..fast_config()
    };
    let (mut modem, handle) = open_modem(config, init_steps());

    let traces: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let traces = Arc::clone(&traces);
        modem.on_debug(move |line| traces.lock().unwrap().push(line.to_string()));
    }

    handle.inject(b"+AREG:3,0\r\n");
    modem.poll().expect("poll should succeed");

    let traces = traces.lock().unwrap();
    assert!(
        traces.iter().any(|t| t.contains("auto-registration")),
        "expected an auto-registration trace, got {:?}",
        *traces
    );
    handle.assert_done();
}
