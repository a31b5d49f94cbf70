//! The full ROH register check list

use super::{Case, Check, CheckKind, Display, Expect};
use crate::core::registers::{
    expected, factory_default, FingerBlock, BATTERY_VOLTAGE, BEEP_PERIOD, BEEP_SWITCH, BOOT_VERSION,
    DEFAULT_NODE_ID, FINGER_COUNT, FINGER_FORCE_LIMIT,
    FINGER_POS_TARGET_MAX_LOSS, FW_REVISION, FW_VERSION, HW_VERSION, NODE_ID, PROTOCOL_VERSION,
    SELF_TEST_LEVEL, THUMB_ROTATION,
};

use Expect::{Equal, Rejected, Within, WriteFails, WriteSucceeds};

const NODE_ID_SKIP: &str = "node id write pending firmware fix";
const FORCE_SKIP: &str = "force sensor not fitted";

fn read(name: &str, title: &str, register: u16, display: Display) -> Check {
    Check::new(
        name,
        title,
        CheckKind::Read {
            register,
            count: 1,
            display,
            expected: None,
        },
    )
}

fn identity(name: &str, title: &str, register: u16, display: Display, expected: &'static str) -> Check {
    Check::new(
        name,
        title,
        CheckKind::Read {
            register,
            count: 1,
            display,
            expected: Some(expected),
        },
    )
}

fn write(name: &str, title: String, register: u16, cases: Vec<Case>) -> Check {
    let restore = factory_default(register).unwrap_or_default();
    Check::new(
        name,
        title,
        CheckKind::WriteVerify {
            register,
            cases,
            restore,
        },
    )
}

/// Cases for a register that keeps `ok` values and ignores `ignored` ones
fn accepts(ok: &[u16], ignored: &[u16]) -> Vec<Case> {
    ok.iter()
        .map(|&v| Case::new(v, Equal))
        .chain(ignored.iter().map(|&v| Case::new(v, Rejected)))
        .collect()
}

/// Every check, in execution order
pub fn catalogue() -> Vec<Check> {
    let mut checks = vec![
        identity(
            "read_protocol_version",
            "read protocol version",
            PROTOCOL_VERSION,
            Display::Version,
            expected::PROTOCOL_VERSION,
        ),
        identity("read_fw_version", "read firmware version", FW_VERSION, Display::Version, expected::FW_VERSION),
        identity(
            "read_fw_revision",
            "read firmware revision",
            FW_REVISION,
            Display::Revision,
            expected::FW_REVISION,
        ),
        identity("read_hw_version", "read hardware version", HW_VERSION, Display::Hardware, expected::HW_VERSION),
        identity(
            "read_boot_version",
            "read boot loader version",
            BOOT_VERSION,
            Display::Version,
            expected::BOOT_VERSION,
        ),
        read("read_node_id", "read node id", NODE_ID, Display::Raw),
        Check::new(
            "write_node_id",
            "write node id, the normal range is [2, 247]",
            CheckKind::NodeId {
                candidates: vec![DEFAULT_NODE_ID + 1],
            },
        )
        .skipped(NODE_ID_SKIP),
        read("read_battery_voltage", "read battery voltage", BATTERY_VOLTAGE, Display::Raw),
        read("read_self_test_level", "read self test level", SELF_TEST_LEVEL, Display::Raw),
        write(
            "write_self_test_level",
            "write self test level, the normal range is {0, 1, 2}, out-of-range values are {3, 65535}".to_string(),
            SELF_TEST_LEVEL,
            vec![
                Case::new(0, Equal),
                Case::new(1, Equal),
                Case::new(2, Equal),
                Case::new(3, WriteFails),
                Case::new(65535, WriteFails),
            ],
        ),
        read("read_beep_switch", "read beep switch", BEEP_SWITCH, Display::Raw),
        write(
            "write_beep_switch",
            "write beep switch, the normal range is 0 or not 0".to_string(),
            BEEP_SWITCH,
            vec![
                Case::new(0, Expect::Reads(0)),
                Case::new(1, Expect::Reads(1)),
                Case::new(255, Expect::Reads(1)),
            ],
        ),
        write(
            "write_beep_period",
            "write beep period, the normal range is [1, 65535], out-of-range value is 0".to_string(),
            BEEP_PERIOD,
            vec![
                Case::new(0, WriteFails),
                Case::new(1, WriteSucceeds),
                Case::new(32767, WriteSucceeds),
                Case::new(65535, WriteSucceeds),
            ],
        ),
    ];

    // (block, low out-of-range, in range, high out-of-range, range text)
    let tuning: [(FingerBlock, &[u16], &[u16], &[u16], &str); 4] = [
        (FingerBlock::P, &[0, 1, 99], &[100, 25000, 50000], &[50001, 65535], "[100, 50000]"),
        (FingerBlock::I, &[], &[0, 5000, 10000], &[10001, 65535], "[0, 10000]"),
        (FingerBlock::D, &[], &[0, 25000, 50000], &[50001, 65535], "[0, 50000]"),
        (FingerBlock::G, &[], &[1, 50, 100], &[0, 101, 65535], "[1, 100]"),
    ];
    for (block, low, ok, high, range) in tuning {
        let ignored: Vec<u16> = low.iter().chain(high).copied().collect();
        for finger in 0..FINGER_COUNT {
            checks.push(finger_read(block, finger));
            let mut cases = accepts(&[], low);
            cases.extend(accepts(ok, high));
            checks.push(write(
                &finger_name("write", block, finger),
                format!(
                    "write finger {}{}, the normal range is {}, out-of-range values are {:?}",
                    block.label(),
                    finger,
                    range,
                    ignored
                ),
                block.at(finger),
                cases,
            ));
        }
    }

    for finger in 0..FINGER_COUNT {
        checks.push(finger_read(FingerBlock::Status, finger));
    }

    for finger in 0..FINGER_COUNT {
        checks.push(finger_read(FingerBlock::CurrentLimit, finger));
        checks.push(write(
            &finger_name("write", FingerBlock::CurrentLimit, finger),
            format!(
                "write finger current limit{}, the normal range is [0, 1299], out-of-range values are [1300, 65535]",
                finger
            ),
            FingerBlock::CurrentLimit.at(finger),
            accepts(&[0, 600, 1299], &[1300, 65535]),
        ));
    }

    for finger in 0..FINGER_COUNT {
        checks.push(finger_read(FingerBlock::Current, finger));
    }

    // Force limits live in the force target block
    for finger in 0..FINGER_COUNT {
        let register = FingerBlock::ForceTarget.at(finger);
        checks.push(
            read(
                &format!("read_finger_force_limit{}", finger),
                &format!("read finger force limit{}", finger),
                register,
                Display::Raw,
            )
            .skipped(FORCE_SKIP),
        );
        let cases = if finger < THUMB_ROTATION {
            accepts(&[0, FINGER_FORCE_LIMIT], &[FINGER_FORCE_LIMIT + 1])
        } else {
            vec![Case::new(0, WriteFails)]
        };
        checks.push(
            write(
                &format!("write_finger_force_limit{}", finger),
                format!("write finger force limit{}", finger),
                register,
                cases,
            )
            .skipped(FORCE_SKIP),
        );
    }

    for finger in 0..THUMB_ROTATION {
        checks.push(finger_read(FingerBlock::Force, finger));
    }

    for finger in 0..FINGER_COUNT {
        checks.push(finger_read(FingerBlock::Speed, finger));
        checks.push(write(
            &finger_name("write", FingerBlock::Speed, finger),
            format!("write finger speed{}, the normal range is [0, 65535]", finger),
            FingerBlock::Speed.at(finger),
            accepts(&[0, 1, 32767, 65535], &[]),
        ));
    }

    for finger in 0..FINGER_COUNT {
        checks.push(finger_read(FingerBlock::PosTarget, finger));
        checks.push(write(
            &finger_name("write", FingerBlock::PosTarget, finger),
            format!("write finger pos target{}, the normal range is [0, 65535]", finger),
            FingerBlock::PosTarget.at(finger),
            pos_target_cases(finger),
        ));
    }

    for finger in 0..FINGER_COUNT {
        checks.push(finger_read(FingerBlock::Pos, finger));
    }

    for finger in 0..FINGER_COUNT {
        let register = FingerBlock::AngleTarget.at(finger);
        checks.push(finger_read(FingerBlock::AngleTarget, finger));
        checks.push(Check::new(
            finger_name("write", FingerBlock::AngleTarget, finger),
            format!("write finger angle target{}, the normal range is [0, 65535]", finger),
            CheckKind::AngleTarget {
                register,
                default: factory_default(register).unwrap_or_default(),
                negative_range: finger == 0,
            },
        ));
    }

    for finger in 0..FINGER_COUNT {
        checks.push(finger_read(FingerBlock::Angle, finger));
    }

    let start = FingerBlock::CurrentLimit.at(0);
    let restore = (0..FINGER_COUNT)
        .map(|finger| factory_default(FingerBlock::CurrentLimit.at(finger)).unwrap_or_default())
        .collect();
    checks.push(Check::new(
        "read_multiple_holding_registers",
        "read multiple registers",
        CheckKind::MultiRead {
            start,
            count: u16::from(FINGER_COUNT),
        },
    ));
    checks.push(Check::new(
        "write_multiple_holding_registers",
        "write multiple registers",
        CheckKind::MultiWrite {
            start,
            values: vec![600; usize::from(FINGER_COUNT)],
            restore,
        },
    ));

    checks
}

fn finger_name(action: &str, block: FingerBlock, finger: u8) -> String {
    format!("{}_finger_{}{}", action, block.key(), finger)
}

fn finger_read(block: FingerBlock, finger: u8) -> Check {
    Check::new(
        finger_name("read", block, finger),
        format!("read finger {}{}", block.label(), finger),
        CheckKind::Read {
            register: block.at(finger),
            count: 1,
            display: Display::Raw,
            expected: None,
        },
    )
}

fn pos_target_cases(finger: u8) -> Vec<Case> {
    let loss = Within(FINGER_POS_TARGET_MAX_LOSS);
    match finger {
        0 => [728, 32767, 32768, 65535].iter().map(|&v| Case::new(v, loss)).collect(),
        THUMB_ROTATION => {
            let floor = factory_default(FingerBlock::PosTarget.at(THUMB_ROTATION)).unwrap_or_default();
            [0, 1, 728]
                .iter()
                .map(|&v| Case::new(v, Expect::Reads(floor)))
                .chain([32767, 32768, 65535].iter().map(|&v| Case::new(v, loss)))
                .collect()
        }
        _ => [0, 1, 32767, 32768, 65535].iter().map(|&v| Case::new(v, loss)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let checks = catalogue();
        let names: HashSet<_> = checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), checks.len());
    }

    #[test]
    fn test_expected_checks_present() {
        let checks = catalogue();
        let find = |name: &str| checks.iter().find(|c| c.name == name).unwrap();

        assert!(find("write_node_id").skip.is_some());
        assert!(find("read_finger_force_limit3").skip.is_some());
        assert!(find("write_finger_p5").skip.is_none());
        assert!(find("read_finger_force4").skip.is_none());
        assert!(checks.iter().all(|c| c.name != "read_finger_force5"));

        match &find("write_finger_g2").kind {
            CheckKind::WriteVerify { register, cases, restore } => {
                assert_eq!(*register, 1077);
                assert_eq!(*restore, 100);
                assert!(cases.contains(&Case::new(0, Rejected)));
                assert!(cases.contains(&Case::new(50, Equal)));
            }
            other => panic!("unexpected kind {other:?}"),
        }

        match &find("write_multiple_holding_registers").kind {
            CheckKind::MultiWrite { start, values, restore } => {
                assert_eq!(*start, 1095);
                assert_eq!(values, &vec![600; 6]);
                assert_eq!(restore, &vec![1299; 6]);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_p_rejections_run_before_valid_values() {
        let checks = catalogue();
        let check = checks.iter().find(|c| c.name == "write_finger_p0").unwrap();
        let CheckKind::WriteVerify { cases, .. } = &check.kind else {
            panic!("unexpected kind");
        };
        let values: Vec<u16> = cases.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![0, 1, 99, 100, 25000, 50000, 50001, 65535]);
    }

    #[test]
    fn test_only_thumb_bend_angle_target_goes_negative() {
        let checks = catalogue();
        let flagged: Vec<&str> = checks
            .iter()
            .filter(|c| matches!(c.kind, CheckKind::AngleTarget { negative_range: true, .. }))
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(flagged, vec!["write_finger_angle_target0"]);
    }

    #[test]
    fn test_identity_reads_carry_expected_versions() {
        let checks = catalogue();
        let find = |name: &str| checks.iter().find(|c| c.name == name).unwrap();

        match &find("read_fw_version").kind {
            CheckKind::Read { display, expected, .. } => {
                assert_eq!(*display, Display::Version);
                assert_eq!(*expected, Some("V3.0.0"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
        match &find("read_hw_version").kind {
            CheckKind::Read { display, expected, .. } => {
                assert_eq!(*display, Display::Hardware);
                assert_eq!(*expected, Some(expected::HW_VERSION));
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert!(matches!(find("read_node_id").kind, CheckKind::Read { expected: None, .. }));
    }

    #[test]
    fn test_thumb_rotation_pos_target_floor() {
        let cases = pos_target_cases(THUMB_ROTATION);
        assert_eq!(cases[0], Case::new(0, Expect::Reads(728)));
        assert_eq!(cases[5], Case::new(65535, Within(32)));
    }
}
