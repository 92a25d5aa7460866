use frankensync_core::contract::{
    DestroyDisposition, MutexOp, MutexState, MutexVerdict, classify_destroy_status,
    mutex_transition,
};
use frankensync_core::errno;

#[derive(Clone, Copy)]
struct Case {
    old_state: MutexState,
    op: MutexOp,
    expected_state: MutexState,
    expected_verdict: MutexVerdict,
}

const fn case(
    old_state: MutexState,
    op: MutexOp,
    expected_state: MutexState,
    expected_verdict: MutexVerdict,
) -> Case {
    Case {
        old_state,
        op,
        expected_state,
        expected_verdict,
    }
}

fn matrix_cases() -> Vec<Case> {
    use MutexOp::*;
    use MutexState::*;
    use MutexVerdict::*;

    vec![
        case(Uninitialized, Init, Unlocked, Proceed),
        case(Uninitialized, Lock, Uninitialized, Misuse(errno::EINVAL)),
        case(Uninitialized, TryLock, Uninitialized, Misuse(errno::EINVAL)),
        case(Uninitialized, Unlock, Uninitialized, Misuse(errno::EINVAL)),
        case(Uninitialized, Destroy, Uninitialized, Ignore),
        case(Unlocked, Init, Unlocked, Refused(errno::EBUSY)),
        case(Unlocked, Lock, Locked, Proceed),
        case(Unlocked, TryLock, Locked, Proceed),
        case(Unlocked, Unlock, Unlocked, Misuse(errno::EPERM)),
        case(Unlocked, Destroy, Destroyed, Proceed),
        case(Locked, Init, Locked, Refused(errno::EBUSY)),
        case(Locked, Lock, Locked, Blocks),
        case(Locked, TryLock, Locked, Proceed),
        case(Locked, Unlock, Unlocked, Proceed),
        case(Locked, Destroy, Destroyed, Proceed),
        case(Destroyed, Init, Unlocked, Proceed),
        case(Destroyed, Lock, Destroyed, Misuse(errno::EINVAL)),
        case(Destroyed, TryLock, Destroyed, Misuse(errno::EINVAL)),
        case(Destroyed, Unlock, Destroyed, Misuse(errno::EINVAL)),
        case(Destroyed, Destroy, Destroyed, Ignore),
    ]
}

#[test]
fn mutex_contract_matrix_is_total_and_deterministic() {
    let cases = matrix_cases();
    assert_eq!(cases.len(), 4 * 5, "every state/op pair is listed once");

    let mut mismatches = Vec::new();
    for c in &cases {
        let first = mutex_transition(c.old_state, c.op);
        let second = mutex_transition(c.old_state, c.op);
        if first != second {
            mismatches.push(format!("{:?}/{:?}: non-deterministic", c.old_state, c.op));
        }
        if first.next != c.expected_state || first.verdict != c.expected_verdict {
            mismatches.push(format!(
                "{:?}/{:?}: expected {:?} {:?}, got {:?} {:?}",
                c.old_state, c.op, c.expected_state, c.expected_verdict, first.next, first.verdict
            ));
        }
    }

    assert!(
        mismatches.is_empty(),
        "contract matrix mismatch(es): {mismatches:?}"
    );
}

#[test]
fn refused_and_misuse_never_change_state() {
    for c in matrix_cases() {
        let out = mutex_transition(c.old_state, c.op);
        if matches!(
            out.verdict,
            MutexVerdict::Refused(_) | MutexVerdict::Misuse(_) | MutexVerdict::Ignore
        ) {
            assert_eq!(out.next, c.old_state, "{:?}/{:?}", c.old_state, c.op);
        }
    }
}

#[test]
fn only_three_destroy_codes_are_tolerated() {
    let tolerated = [errno::EBUSY, errno::EAGAIN, errno::EINPROGRESS];
    for code in 1..200 {
        let expected = if tolerated.contains(&code) {
            DestroyDisposition::TolerableRace
        } else {
            DestroyDisposition::Fatal
        };
        assert_eq!(classify_destroy_status(code), expected, "code {code}");
    }
    assert_eq!(classify_destroy_status(0), DestroyDisposition::Destroyed);
}
