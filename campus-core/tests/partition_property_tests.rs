//! Property tests for notification partitioning and summaries.

use campus_core::{
    partition_notifications, AnnouncementId, Notification, NotificationId, NotificationSummary,
};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

fn arb_notifications() -> impl Strategy<Value = Vec<Notification>> {
    prop::collection::vec(any::<bool>(), 0..40).prop_map(|flags| {
        flags
            .into_iter()
            .enumerate()
            .map(|(i, is_read)| Notification {
                id: NotificationId(i as u64),
                message: format!("notice {}", i),
                reference_id: AnnouncementId(i as u64 / 2),
                created_timestamp: Utc.timestamp_opt(1_700_000_000 - i as i64, 0).unwrap(),
                is_read,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn partition_is_exhaustive_and_disjoint(list in arb_notifications()) {
        let partition = partition_notifications(&list);
        prop_assert_eq!(partition.unread.len() + partition.read.len(), list.len());
        prop_assert!(partition.unread.iter().all(|n| !n.is_read));
        prop_assert!(partition.read.iter().all(|n| n.is_read));
    }

    #[test]
    fn partition_keeps_relative_order(list in arb_notifications()) {
        let partition = partition_notifications(&list);
        // ids were assigned in gateway order, so each side must stay ascending
        prop_assert!(partition.unread.windows(2).all(|w| w[0].id < w[1].id));
        prop_assert!(partition.read.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn summary_of_list_satisfies_invariant(list in arb_notifications()) {
        let summary = NotificationSummary::from_notifications(&list);
        prop_assert!(summary.validate().is_ok());
        prop_assert_eq!(summary.unread as usize, partition_notifications(&list).unread.len());
    }
}
