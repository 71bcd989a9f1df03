use serde_json::json;
use sl_matcher::{evaluate, glob_matches};
use sl_schemas::{Event, EventPayload, Filter, Transaction, TxType};

fn contract_call(tx_id: &str, contract: &str, function: &str, sender: &str) -> Transaction {
    Transaction {
        tx_id: tx_id.to_string(),
        block_height: 100,
        tx_index: 0,
        kind: TxType::ContractCall,
        sender: sender.to_string(),
        status: "success".to_string(),
        contract_id: Some(contract.to_string()),
        function_name: Some(function.to_string()),
        raw_tx: "00".to_string(),
    }
}

fn deploy(tx_id: &str, contract_id: &str, sender: &str) -> Transaction {
    Transaction {
        tx_id: tx_id.to_string(),
        block_height: 100,
        tx_index: 1,
        kind: TxType::SmartContract,
        sender: sender.to_string(),
        status: "success".to_string(),
        contract_id: Some(contract_id.to_string()),
        function_name: None,
        raw_tx: "00".to_string(),
    }
}

fn event(id: i64, payload: EventPayload) -> Event {
    Event {
        id,
        tx_id: format!("0xtx{id}"),
        block_height: 100,
        event_index: id as i32,
        payload,
    }
}

fn stx_transfer(id: i64, sender: &str, recipient: &str, amount: &str) -> Event {
    event(
        id,
        EventPayload::StxTransfer {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount: amount.to_string(),
            memo: None,
        },
    )
}

#[test]
fn contract_call_filter_matches_on_all_present_fields() {
    let txs = vec![
        contract_call("0x01", "SP2X.marketplace", "list", "SP1AAA"),
        contract_call("0x02", "SP2X.marketplace", "bid", "SP1BBB"),
        contract_call("0x03", "SP2X.other", "list", "SP1AAA"),
    ];
    let filter = Filter::ContractCall {
        contract_id: Some("SP2X.marketplace".to_string()),
        function_name: Some("list".to_string()),
        caller: None,
    };

    let result = evaluate(&[filter], &txs, &[]);
    assert!(result.any_match);
    assert_eq!(result.transactions.len(), 1);
    assert_eq!(result.transactions[0].tx_id, "0x01");
    assert!(result.events.is_empty());
}

#[test]
fn function_name_glob_matches_any_substring() {
    let txs = vec![
        contract_call("0x01", "SP2X.marketplace", "list-asset", "SP1AAA"),
        contract_call("0x02", "SP2X.marketplace", "delist-asset", "SP1AAA"),
        contract_call("0x03", "SP2X.marketplace", "bid", "SP1AAA"),
    ];
    let filter = Filter::ContractCall {
        contract_id: None,
        function_name: Some("*list*".to_string()),
        caller: None,
    };

    let result = evaluate(&[filter], &txs, &[]);
    let ids: Vec<_> = result.transactions.iter().map(|t| t.tx_id.as_str()).collect();
    assert_eq!(ids, vec!["0x01", "0x02"]);
}

#[test]
fn glob_escapes_regex_metacharacters() {
    // A literal dot must not act as a regex wildcard.
    assert!(!glob_matches("a.c", "abc"));
    assert!(glob_matches("a.c", "a.c"));
    // `(` and `+` must not produce a compile error or inject syntax.
    assert!(glob_matches("call(+)*", "call(+)-v2"));
    assert!(!glob_matches("call(+)*", "callx"));
}

#[test]
fn contract_deploy_matches_name_component_of_contract_id() {
    let txs = vec![
        deploy("0x01", "SP1AAA.amm-pool-v2", "SP1AAA"),
        deploy("0x02", "SP1AAA.registry", "SP1AAA"),
        deploy("0x03", "SP1BBB.amm-pool-v3", "SP1BBB"),
    ];
    let filter = Filter::ContractDeploy {
        deployer: Some("SP1AAA".to_string()),
        contract_name: Some("amm-pool-*".to_string()),
    };

    let result = evaluate(&[filter], &txs, &[]);
    assert_eq!(result.transactions.len(), 1);
    assert_eq!(result.transactions[0].tx_id, "0x01");
}

#[test]
fn amount_bounds_keep_u128_precision() {
    // u64::MAX + 1 and u128::MAX still compare correctly.
    let big = "18446744073709551616";
    let max = "340282366920938463463374607431768211455";
    let events = vec![
        stx_transfer(1, "SP1AAA", "SP1BBB", big),
        stx_transfer(2, "SP1AAA", "SP1BBB", max),
        stx_transfer(3, "SP1AAA", "SP1BBB", "100"),
    ];

    let filter = Filter::StxTransfer {
        sender: None,
        recipient: None,
        min_amount: Some(big.to_string()),
        max_amount: None,
    };
    let result = evaluate(&[filter], &[], &events);
    let ids: Vec<_> = result.events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2]);

    let bounded = Filter::StxTransfer {
        sender: None,
        recipient: None,
        min_amount: Some("50".to_string()),
        max_amount: Some("1000".to_string()),
    };
    let result = evaluate(&[bounded], &[], &events);
    let ids: Vec<_> = result.events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![3]);
}

#[test]
fn missing_amount_defaults_to_zero() {
    let events = vec![stx_transfer(1, "SP1AAA", "SP1BBB", "not-a-number")];
    let min = Filter::StxTransfer {
        sender: None,
        recipient: None,
        min_amount: Some("1".to_string()),
        max_amount: None,
    };
    assert!(!evaluate(&[min], &[], &events).any_match);

    let max = Filter::StxTransfer {
        sender: None,
        recipient: None,
        min_amount: None,
        max_amount: Some("10".to_string()),
    };
    assert!(evaluate(&[max], &[], &events).any_match);
}

#[test]
fn overlapping_filters_dedup_by_tx_and_event_id() {
    let txs = vec![contract_call("0x01", "SP2X.marketplace", "list", "SP1AAA")];
    let events = vec![stx_transfer(1, "SP1AAA", "SP1BBB", "500")];

    // Both filters match the same tx; both transfer filters match the event.
    let filters = vec![
        Filter::ContractCall {
            contract_id: Some("SP2X.marketplace".to_string()),
            function_name: None,
            caller: None,
        },
        Filter::ContractCall {
            contract_id: None,
            function_name: Some("list".to_string()),
            caller: None,
        },
        Filter::StxTransfer {
            sender: Some("SP1AAA".to_string()),
            recipient: None,
            min_amount: None,
            max_amount: None,
        },
        Filter::StxTransfer {
            sender: None,
            recipient: Some("SP1BBB".to_string()),
            min_amount: None,
            max_amount: None,
        },
    ];

    let result = evaluate(&filters, &txs, &events);
    assert_eq!(result.transactions.len(), 1, "tx present at most once");
    assert_eq!(result.events.len(), 1, "event present at most once");
}

#[test]
fn order_is_first_filter_first_match() {
    let events = vec![
        stx_transfer(1, "SP1AAA", "SP1BBB", "10"),
        stx_transfer(2, "SP1CCC", "SP1DDD", "10"),
    ];
    // The first filter matches event 2 only, the second matches event 1.
    let filters = vec![
        Filter::StxTransfer {
            sender: Some("SP1CCC".to_string()),
            recipient: None,
            min_amount: None,
            max_amount: None,
        },
        Filter::StxTransfer {
            sender: Some("SP1AAA".to_string()),
            recipient: None,
            min_amount: None,
            max_amount: None,
        },
    ];
    let result = evaluate(&filters, &[], &events);
    let ids: Vec<_> = result.events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![2, 1]);
}

#[test]
fn nft_token_id_compares_exactly() {
    let events = vec![
        event(
            1,
            EventPayload::NftTransfer {
                asset_identifier: "SP2X.punks::punk".to_string(),
                sender: "SP1AAA".to_string(),
                recipient: "SP1BBB".to_string(),
                value: json!("u1234"),
            },
        ),
        event(
            2,
            EventPayload::NftTransfer {
                asset_identifier: "SP2X.punks::punk".to_string(),
                sender: "SP1AAA".to_string(),
                recipient: "SP1BBB".to_string(),
                value: json!("u12345"),
            },
        ),
    ];
    let filter = Filter::NftTransfer {
        asset_identifier: Some("SP2X.punks::punk".to_string()),
        sender: None,
        recipient: None,
        token_id: Some("u1234".to_string()),
    };
    let result = evaluate(&[filter], &[], &events);
    let ids: Vec<_> = result.events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1]);
}

#[test]
fn print_event_matches_topic_and_contains() {
    let events = vec![
        event(
            1,
            EventPayload::SmartContractEvent {
                contract_id: "SP2X.marketplace".to_string(),
                topic: "print".to_string(),
                value: json!({"action": "list-asset", "price": "500"}),
            },
        ),
        event(
            2,
            EventPayload::SmartContractEvent {
                contract_id: "SP2X.marketplace".to_string(),
                topic: "print".to_string(),
                value: json!({"action": "cancel"}),
            },
        ),
        event(
            3,
            EventPayload::SmartContractEvent {
                contract_id: "SP2X.marketplace".to_string(),
                topic: "other".to_string(),
                value: json!({"action": "list-asset"}),
            },
        ),
    ];
    let filter = Filter::PrintEvent {
        contract_id: Some("SP2X.marketplace".to_string()),
        topic: Some("print".to_string()),
        contains: Some("list-asset".to_string()),
    };
    let result = evaluate(&[filter], &[], &events);
    let ids: Vec<_> = result.events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1]);
}

#[test]
fn empty_result_reports_no_match() {
    let result = evaluate(
        &[Filter::StxMint {
            recipient: Some("SP1ZZZ".to_string()),
            min_amount: None,
        }],
        &[],
        &[stx_transfer(1, "SP1AAA", "SP1BBB", "10")],
    );
    assert!(!result.any_match);
    assert!(result.transactions.is_empty());
    assert!(result.events.is_empty());
}
