//! Full check suite against the virtual hand

use rohcheck_core::core::registers::{factory_default, FingerBlock, SELF_TEST_LEVEL};
use rohcheck_core::{
    catalogue, CheckStatus, ClientOptions, RebootWaitConfig, SharedHand, SuiteRunner, Transport, VirtualHand,
};
use std::time::Duration;

fn runner(hand: &SharedHand) -> SuiteRunner {
    SuiteRunner::new(
        Transport::Simulated(hand.clone()),
        ClientOptions {
            node_id: 2,
            settle_delay: Duration::ZERO,
            response_timeout: Duration::from_millis(50),
        },
    )
    .with_reboot(RebootWaitConfig {
        max_attempts: 5,
        delay: Duration::from_millis(1),
    })
}

#[tokio::test]
async fn test_full_suite_passes() {
    let hand = VirtualHand::default().shared();
    let checks = catalogue();
    let report = runner(&hand).run(&checks).await;

    let failures: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.status == CheckStatus::Failed)
        .map(|r| format!("{}: {:?}", r.name, r.message))
        .collect();
    assert!(failures.is_empty(), "failed checks: {:#?}", failures);

    let summary = report.summary();
    assert_eq!(summary.total, checks.len());
    assert_eq!(summary.skipped, checks.iter().filter(|c| c.skip.is_some()).count());
    assert!(summary.skipped > 0);
    assert!(report.success());
}

#[tokio::test]
async fn test_defaults_restored_after_suite() {
    let hand = VirtualHand::default().shared();
    runner(&hand).run(&catalogue()).await;

    let hand = hand.lock();
    assert_eq!(hand.get(SELF_TEST_LEVEL), 1);
    for finger in 0..6 {
        for block in [FingerBlock::P, FingerBlock::I, FingerBlock::D, FingerBlock::G, FingerBlock::CurrentLimit] {
            let address = block.at(finger);
            assert_eq!(Some(hand.get(address)), factory_default(address), "register {}", address);
        }
    }
    assert_eq!(hand.node_id(), 2);
}

#[tokio::test]
async fn test_offline_hand_skips_everything() {
    let hand = VirtualHand::default().shared();
    hand.lock().set_online(false);
    let report = runner(&hand).with_filter("^read_").unwrap().run(&catalogue()).await;

    let summary = report.summary();
    assert!(summary.total > 0);
    assert_eq!(summary.skipped, summary.total);
    assert!(report
        .results
        .iter()
        .any(|r| r.message.as_deref() == Some("could not connect to modbus")));
    assert_eq!(hand.lock().stats().requests, 0);
}

#[tokio::test]
async fn test_silent_hand_fails_check() {
    let hand = VirtualHand::default().shared();
    let report = runner(&hand)
        .with_filter("^write_finger_g0$")
        .unwrap()
        .run(&catalogue())
        .await;
    assert_eq!(report.summary().passed, 1);

    // A hand answering on another node never replies to the suite
    let hand = VirtualHand::new(9).shared();
    let report = runner(&hand)
        .with_filter("^read_fw_version$")
        .unwrap()
        .run(&catalogue())
        .await;
    let result = report.get("read_fw_version").unwrap();
    assert_eq!(result.status, CheckStatus::Failed);
    assert!(!report.success());
}
