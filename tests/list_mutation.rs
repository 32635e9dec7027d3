mod common;

use bouncer::access::AccessListStore;
use bouncer::{AccessList, CallContext, Command, Reply};
use common::test_helpers::{harness, limits};

fn msg(ok: bool, message: &str) -> Reply {
    Reply::Message { ok, message: message.to_string() }
}

#[tokio::test]
async fn subnet_cannot_live_in_both_lists() {
    let h = harness(limits(5, 5, 5, 60));
    let ctx = CallContext::background();

    let added = h.bouncer.execute(&ctx, Command::AddToWhitelist { subnet: "5.5.5.0/24".into() }).await.unwrap();
    assert_eq!(added, msg(true, "Added 5.5.5.0/24 to the whitelist"));

    let refused = h.bouncer.execute(&ctx, Command::AddToBlacklist { subnet: "5.5.5.0/24".into() }).await.unwrap();
    assert_eq!(refused, msg(false, "5.5.5.0/24 is already whitelisted"));
    assert_eq!(h.lists.len(AccessList::Blacklist), 0);
}

#[tokio::test]
async fn host_bits_do_not_dodge_the_conflict_check() {
    let h = harness(limits(5, 5, 5, 60));
    let ctx = CallContext::background();
    h.bouncer.execute(&ctx, Command::AddToBlacklist { subnet: "172.16.4.0/22".into() }).await.unwrap();

    let refused = h.bouncer.execute(&ctx, Command::AddToWhitelist { subnet: "172.16.5.17/22".into() }).await.unwrap();
    assert_eq!(refused, msg(false, "172.16.4.0/22 is already blacklisted"));
}

#[tokio::test]
async fn remove_of_unknown_subnet_is_not_an_error() {
    let h = harness(limits(5, 5, 5, 60));
    let reply = h
        .bouncer
        .execute(&CallContext::background(), Command::RemoveFromBlacklist { subnet: "1.1.1.0/24".into() })
        .await
        .unwrap();
    assert_eq!(reply, msg(false, "1.1.1.0/24 not found in the blacklist"));
}

#[tokio::test]
async fn list_networks_reports_canonical_entries() {
    let h = harness(limits(5, 5, 5, 60));
    let ctx = CallContext::background();
    for subnet in ["10.9.8.7/8", "192.168.100.1/24", "2001:db8::1/48"] {
        h.bouncer.execute(&ctx, Command::AddToWhitelist { subnet: subnet.into() }).await.unwrap();
    }
    // Rows written by other tools are tolerated.
    h.lists.insert(AccessList::Whitelist, "garbage").await.unwrap();

    let reply = h.bouncer.execute(&ctx, Command::ListNetworks { list: AccessList::Whitelist }).await.unwrap();
    let Reply::Networks { networks, .. } = reply else { panic!("unexpected reply {reply:?}") };
    assert_eq!(networks, vec!["10.0.0.0/8", "192.168.100.0/24", "2001:db8::/48"]);

    let reply = h
        .bouncer
        .execute(&ctx, bouncer::Command::Authorize(bouncer::AuthorizeRequest::ip("192.168.100.254")))
        .await
        .unwrap();
    assert_eq!(reply, Reply::Verdict { authorized: true, message: "IP is whitelisted".into() });
}

#[tokio::test]
async fn malformed_subnet_is_an_input_error() {
    let h = harness(limits(5, 5, 5, 60));
    for subnet in ["10.0.0.1", "10.0.0.0/40", ""] {
        let err = h
            .bouncer
            .execute(&CallContext::background(), Command::AddToBlacklist { subnet: subnet.into() })
            .await
            .unwrap_err();
        assert!(err.is_input_error(), "{subnet:?}");
    }
    assert_eq!(h.lists.len(AccessList::Blacklist), 0);
}
