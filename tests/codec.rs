//! Frame codec against a scripted UART.

mod common;

use common::*;
use embassy_futures::block_on;
use embassy_time::{Duration, Instant, Timer};

use mdb_cashless::command::{self, Frame, Request, VmcIdentity};
use mdb_cashless::MDBError;

const BLOCK: [u8; 3] = [0x05, 0x00, 0xB4];

fn every_request() -> Vec<Request> {
    vec![
        Request::Reset,
        Request::SetupConfig {
            level: 1,
            columns: 20,
            rows: 2,
            display_info: 0,
        },
        Request::SetupPrices {
            max_price: 0xFFFF,
            min_price: 0,
        },
        Request::Poll,
        Request::VendRequest { price: 200, item: 3 },
        Request::VendCancel,
        Request::VendSuccess { item: 3 },
        Request::VendFailure,
        Request::VendComplete,
        Request::VendCashSale { price: 90, item: 2 },
        Request::ReaderDisable,
        Request::ReaderEnable,
        Request::ReaderCancel,
        Request::ExpansionId(VmcIdentity {
            manufacturer_code: *b"ABC",
            serial_number: *b"123456789012",
            model_number: *b"MODEL-000001",
            software_version: 0x0203,
        }),
    ]
}

#[test]
fn ack_ends_the_exchange() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();
        rig.uart.push_handshake(0x00);
        assert_eq!(bus.send_frame(&BLOCK).await, Ok(()));
        assert_eq!(rig.uart.take_sent(), answer_block(&BLOCK));
    });
}

#[test]
fn nak_and_ret_resend_the_block() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();
        rig.uart.push_handshake(0xFF);
        rig.uart.push_handshake(0xAA);
        rig.uart.push_handshake(0x00);
        assert_eq!(bus.send_frame(&BLOCK).await, Ok(()));

        let once = answer_block(&BLOCK);
        let sent = rig.uart.take_sent();
        assert_eq!(sent.len(), once.len() * 3);
        for copy in sent.chunks(once.len()) {
            assert_eq!(copy, once.as_slice());
        }
    });
}

#[test]
fn silence_resends_until_acked() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();
        rig.uart.push_handshake(0x00);
        rig.uart.0.borrow_mut().ready_at = Some(Instant::now() + Duration::from_millis(8));
        assert_eq!(bus.send_frame(&BLOCK).await, Ok(()));

        let sent = rig.uart.take_sent();
        let once = answer_block(&BLOCK).len();
        assert_eq!(sent.len() % once, 0);
        assert!(sent.len() / once >= 2);
    });
}

#[test]
fn unexpected_handshake_is_reported() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();
        rig.uart.push_handshake(0x55);
        assert_eq!(
            bus.send_frame(&BLOCK).await,
            Err(MDBError::UnexpectedHandshake)
        );
    });
}

#[test]
fn bare_handshakes_carry_the_mode_bit() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();
        bus.send_ack().await.unwrap();
        bus.send_nack().await.unwrap();
        assert_eq!(rig.uart.take_sent(), vec![(0x00, true), (0xFF, true)]);
    });
}

#[test]
fn idle_line_yields_nothing() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();
        assert_eq!(bus.receive_frame().await, Ok(None));
    });
}

#[test]
fn every_supported_command_decodes_and_reencodes() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();
        let requests = every_request();
        assert_eq!(requests.len(), command::supported().count());

        for request in requests {
            let wire = request.to_frame().encode(0x10);
            rig.uart.push_raw(&wire);
            let frame = bus.receive_frame().await.unwrap().unwrap();
            assert_eq!(frame.encode(0x10), wire);
            assert_eq!(Request::try_from(&frame), Ok(request));
        }
        assert_eq!(rig.uart.pending_rx(), 0);
    });
}

#[test]
fn mode_bit_inside_a_frame_is_malformed() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();
        rig.uart.push_raw(&[0x14]);
        rig.uart.0.borrow_mut().rx.push_back((0x01, true));
        assert_eq!(bus.receive_frame().await, Err(MDBError::MalformedMessage));
    });
}

#[test]
fn other_addresses_are_ignored() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();
        //Cashless #2 POLL
        rig.uart.push_raw(&[0x62]);
        assert_eq!(bus.receive_frame().await, Ok(None));
        //A data byte without the mode bit can never start a frame
        rig.uart.push_handshake(0x12);
        assert_eq!(bus.receive_frame().await, Ok(None));
    });
}

#[test]
fn checksum_is_checked() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();
        rig.uart.push_raw(&[0x12, 0x13]);
        assert_eq!(bus.receive_frame().await, Err(MDBError::WrongChecksum));

        rig.uart.push_raw(&[0x12, 0x12]);
        let frame = bus.receive_frame().await.unwrap().unwrap();
        assert_eq!(
            frame,
            Frame {
                command: command::POLL_CMD,
                subcommand: None,
                data: Default::default(),
            }
        );
    });
}

#[test]
fn held_reset_line_reinitialises_the_transport() {
    block_on(async {
        let rig = Rig::new();
        let mut bus = rig.bus();

        rig.reset.0.set(true);
        assert!(!bus.watch_reset_line().await);
        Timer::after(Duration::from_millis(20)).await;
        assert!(!bus.watch_reset_line().await);
        assert_eq!(bus.bus_resets(), 0);

        Timer::after(Duration::from_millis(100)).await;
        assert_eq!(bus.receive_frame().await, Ok(None));
        assert_eq!(bus.bus_resets(), 1);

        //Characters that arrived while the line was held are dropped
        rig.reset.0.set(true);
        assert!(!bus.watch_reset_line().await);
        rig.uart.push_raw(&[0x12, 0x12]);
        Timer::after(Duration::from_millis(100)).await;
        assert!(bus.watch_reset_line().await);
        assert_eq!(rig.uart.pending_rx(), 0);
        assert_eq!(bus.bus_resets(), 2);

        //Released before the hold time: no reset
        rig.reset.0.set(false);
        bus.watch_reset_line().await;
        rig.reset.0.set(true);
        bus.watch_reset_line().await;
        rig.reset.0.set(false);
        Timer::after(Duration::from_millis(120)).await;
        bus.watch_reset_line().await;
        assert_eq!(bus.bus_resets(), 2);
    });
}
