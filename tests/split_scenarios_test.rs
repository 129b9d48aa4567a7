mod common;

use common::{PAYER, inbound_processor, payment, roster_resolver};
use soak::application::outbound::OutboundProcessor;
use soak::domain::directive::Directive;
use soak::domain::payment::{IncomingPayment, OutgoingRequest};
use soak::domain::policy::LEFTOVER_NOTICE;
use soak::infrastructure::dry_run::DryRunNetwork;
use soak::infrastructure::in_memory::InMemoryQueue;
use std::sync::Arc;

/// Runs one payment through both loops and returns the executed transfers.
async fn settle(payment: IncomingPayment, online: &[&str]) -> Vec<OutgoingRequest> {
    let notifications = InMemoryQueue::new();
    let outgoing = InMemoryQueue::new();
    notifications.push_json(&payment).await.unwrap();

    inbound_processor(&outgoing, roster_resolver(online))
        .run(notifications.subscribe())
        .await
        .unwrap();

    let network = Arc::new(DryRunNetwork::new());
    OutboundProcessor::new(network.clone(), "secret")
        .with_max_in_flight(1)
        .run(outgoing.subscribe())
        .await
        .unwrap();

    network.transfers().await
}

fn meta(transfer: &OutgoingRequest) -> Directive {
    Directive::decode(transfer.meta.as_deref())
}

#[tokio::test]
async fn test_uneven_split_refunds_leftover() {
    let transfers = settle(payment(1, 100, None), &["alice", "bob", "carol"]).await;

    assert_eq!(transfers.len(), 4);
    let refund = &transfers[0];
    assert_eq!(refund.to, PAYER);
    assert_eq!(refund.amount, 1);
    assert_eq!(meta(refund).message.as_deref(), Some(LEFTOVER_NOTICE));
    assert_eq!(meta(refund).error, None);

    let shares: Vec<_> = transfers[1..]
        .iter()
        .map(|t| (t.to.as_str(), t.amount))
        .collect();
    assert_eq!(
        shares,
        vec![
            ("alice@switchcraft.kst", 33),
            ("bob@switchcraft.kst", 33),
            ("carol@switchcraft.kst", 33),
        ]
    );
    assert_eq!(transfers.iter().map(|t| t.amount).sum::<u64>(), 100);
}

#[tokio::test]
async fn test_amount_below_recipient_count_is_refunded() {
    let transfers = settle(payment(2, 1, None), &["alice", "bob"]).await;

    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].to, PAYER);
    assert_eq!(transfers[0].amount, 1);
    assert_eq!(
        meta(&transfers[0]).error.as_deref(),
        Some("insufficient amount, minimum is 2")
    );
}

#[tokio::test]
async fn test_nine_between_two_splits_with_leftover() {
    let transfers = settle(payment(3, 9, None), &["alice", "bob"]).await;

    let amounts: Vec<_> = transfers.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![1, 4, 4]);
}

#[tokio::test]
async fn test_message_is_carried_on_even_split() {
    let transfers = settle(
        payment(4, 100, Some("soak.kst;username=steve;message=good game")),
        &["alice", "bob"],
    )
    .await;

    assert_eq!(transfers.len(), 2);
    for transfer in &transfers {
        assert_eq!(transfer.amount, 50);
        assert_eq!(
            meta(transfer).message.as_deref(),
            Some("steve donated 50 to you through soak.kst! They left a message: good game")
        );
    }
}

#[tokio::test]
async fn test_message_with_small_split_is_refunded() {
    let transfers = settle(
        payment(5, 25, Some("message=hello")),
        &["alice", "bob", "carol"],
    )
    .await;

    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].amount, 25);
    assert_eq!(
        meta(&transfers[0]).error.as_deref(),
        Some("message requires per-recipient minimum of 10, got 8")
    );
}

#[tokio::test]
async fn test_no_recipients_refunds_whole_payment() {
    let transfers = settle(payment(6, 1_000, None), &[]).await;

    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].amount, 1_000);
    assert_eq!(
        meta(&transfers[0]).error.as_deref(),
        Some("no eligible recipients")
    );
}

#[tokio::test]
async fn test_payer_is_not_paid_back_as_recipient() {
    let transfers = settle(
        payment(7, 20, Some("username=alice")),
        &["alice", "bob"],
    )
    .await;

    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].to, "bob@switchcraft.kst");
    assert_eq!(transfers[0].amount, 20);
}

#[tokio::test]
async fn test_refund_goes_to_return_address() {
    let transfers = settle(payment(8, 50, Some("return=kreturn001")), &[]).await;

    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].to, "kreturn001");
}

#[tokio::test]
async fn test_zero_value_payment_sends_nothing() {
    let transfers = settle(payment(9, 0, None), &["alice"]).await;
    assert!(transfers.is_empty());
}
