//! Property-based tests for whole sessions under random network behaviour.
//!
//! Random sequences of typing, call starts, clock advances and broker-side
//! disconnects run against a three-member group. Whatever happens, each
//! member's log must be an in-order subsequence of what the broker stored,
//! nobody sees their own call banner, and everyone ends up connected again
//! once the network calms down.

use std::time::Duration;

use proptest::prelude::*;
use studyhall_app::ConnectionIndicator;
use studyhall_harness::SimCluster;
use studyhall_proto::GroupId;

const MEMBERS: [(&str, &str); 3] =
    [("alice@x.com", "Alice"), ("bob@x.com", "Bob"), ("carol@x.com", "Carol")];

#[derive(Debug, Clone)]
enum Op {
    Chat(usize),
    Call(usize),
    Advance(u64),
    Kill(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => (0..MEMBERS.len()).prop_map(Op::Chat),
        1 => (0..MEMBERS.len()).prop_map(Op::Call),
        3 => (1u64..7).prop_map(Op::Advance),
        1 => (0..MEMBERS.len()).prop_map(Op::Kill),
    ]
}

fn is_subsequence(needle: &[String], haystack: &[String]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|item| rest.any(|candidate| candidate == item))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_logs_follow_broker_order(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let group = GroupId::new("9").unwrap();
        let mut cluster = SimCluster::new(seed, group.clone());
        let members: Vec<usize> = MEMBERS
            .iter()
            .map(|(email, name)| cluster.join(email, name).unwrap())
            .collect();

        let mut next = 0u32;
        for op in ops {
            match op {
                Op::Chat(member) => {
                    next += 1;
                    cluster.type_line(members[member], &format!("m{next}")).unwrap();
                },
                Op::Call(member) => cluster.type_line(members[member], "/call").unwrap(),
                Op::Advance(secs) => {
                    cluster.advance(Duration::from_secs(secs)).unwrap();
                },
                Op::Kill(member) => {
                    let session = cluster.session(members[member]).driver().session();
                    if let Some(session) = session {
                        cluster.broker().kill(session, "connection reset");
                    }
                    cluster.settle().unwrap();
                },
            }

            for (index, (email, _)) in MEMBERS.iter().enumerate() {
                let banner = cluster.session(members[index]).app().call_banner();
                prop_assert!(banner.is_none_or(|b| b.sender != *email));
            }
        }

        let stored: Vec<String> = cluster
            .broker()
            .history(&group)
            .unwrap()
            .into_iter()
            .map(|payload| payload.content)
            .collect();

        for member in &members {
            let log = cluster.session(*member).log_contents();
            prop_assert!(is_subsequence(&log, &stored), "log {:?} vs stored {:?}", log, stored);
        }

        // Past any pending retry, everyone is back.
        cluster.advance(Duration::from_secs(6)).unwrap();
        for member in &members {
            prop_assert_eq!(
                cluster.session(*member).app().indicator(),
                ConnectionIndicator::Connected
            );
        }
    }
}
