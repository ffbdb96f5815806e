//! CONTEXT: Failure and resource paths across two mailbox cores
//! INTENT: Prove contention, overflow and silence degrade predictably
//! DEPS: axon-ipc (links, dispatch), mailbox-mmio sim (hardware model)
//! TESTS: Ownership steal rejected, queue burst bound, reply timeout,
//! interrupt lines tracking subscriptions
// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use axon_e2e::{
    bench, client_link, server_link, SimCore, CLIENT_ACK_IRQ, CLIENT_ID, CLIENT_RCV_IRQ,
    SERVER_ACK_IRQ, SERVER_ID, SERVER_RCV_IDX, SERVER_RCV_IRQ,
};
use axon_ipc::{IpcCore, LinkError, LinkPhase, CMD_QUEUE_DEPTH};
use mailbox_mmio::regs::config_word;
use mailbox_mmio::sim::SimIrq;
use mailbox_mmio::{MboxError, MboxSystem};

#[test]
fn second_owner_cannot_steal_the_link() {
    let bench = bench();
    bench.server.connect(server_link()).expect("server connect");
    let owned = config_word(SERVER_ID, CLIENT_ID, SERVER_ID);
    assert_eq!(bench.block.config(0), owned);

    // A rival processor tries to claim the same instances for itself.
    let rival: SimCore =
        IpcCore::new(MboxSystem::new(bench.block.bus(), SimIrq::new()), bench.clock.clone());
    let mut cfg = server_link();
    cfg.server_id = 0x33;
    let err = rival.connect(cfg).expect_err("rival connect should fail");
    assert!(matches!(err, LinkError::Endpoint(MboxError::OwnershipConflict { .. })));

    // The rightful owner's programming survived untouched.
    assert_eq!(bench.block.config(0), owned);
    assert_eq!(bench.block.config(1), config_word(SERVER_ID, SERVER_ID, CLIENT_ID));
}

#[test]
fn queue_holds_capacity_minus_one_under_burst() {
    let bench = bench();
    bench.server.connect(server_link()).expect("server connect");
    let link = bench.client.connect(client_link()).expect("client connect");

    // Deliver each send by hand so the server's dispatch loop never runs
    // between them.
    for tag in 0..CMD_QUEUE_DEPTH as u8 {
        bench.client.send(link, &[0x60 + tag]).expect("send");
        bench.server.rcv_isr(SERVER_RCV_IDX);
    }
    // Capacity 4 holds 3; the newest burst entry was dropped.
    assert_eq!(bench.server.process_pending(), 3);
}

#[test]
fn request_times_out_when_no_handler_replies() {
    let bench = bench();
    bench.server.connect(server_link()).expect("server connect");
    let link = bench.client.connect(client_link()).expect("client connect");

    let mut reply = [0u8; 8];
    let err = bench
        .client
        .request(link, &[0x9], &mut reply, Duration::from_millis(5))
        .expect_err("request should time out");
    assert_eq!(err, LinkError::Timeout);
    // The failed request leaves the link ready for the next attempt.
    assert_eq!(bench.client.phase(link), Ok(LinkPhase::Idle));
}

#[test]
fn irq_lines_follow_endpoint_subscriptions() {
    let bench = bench();
    let server_link_id = bench.server.connect(server_link()).expect("server connect");
    assert!(bench.server_irq.enabled(SERVER_RCV_IRQ));
    assert!(bench.server_irq.enabled(SERVER_ACK_IRQ));

    let client_link_id = bench.client.connect(client_link()).expect("client connect");
    assert!(bench.client_irq.enabled(CLIENT_RCV_IRQ));
    assert!(bench.client_irq.enabled(CLIENT_ACK_IRQ));

    bench.server.disconnect(server_link_id).expect("server disconnect");
    assert!(!bench.server_irq.enabled(SERVER_RCV_IRQ));
    assert!(!bench.server_irq.enabled(SERVER_ACK_IRQ));
    // The client's lines belong to its own controller and stay up.
    assert!(bench.client_irq.enabled(CLIENT_RCV_IRQ));

    bench.client.disconnect(client_link_id).expect("client disconnect");
    assert!(!bench.client_irq.enabled(CLIENT_RCV_IRQ));
    assert!(!bench.client_irq.enabled(CLIENT_ACK_IRQ));
    // Exactly one enable per line over the whole dance.
    assert_eq!(bench.server_irq.enable_count(SERVER_RCV_IRQ), 1);
    assert_eq!(bench.client_irq.enable_count(CLIENT_ACK_IRQ), 1);
}
