// Integration tests for signed transfers, mining and balances

use powledger::blockchain::block::meets_difficulty;
use powledger::blockchain::chain::{genesis_prev_hash, is_valid_chain};
use powledger::blockchain::{
    Address, Amount, AmountError, AuthError, Block, Ledger, MiningError, Transaction,
    TransactionRequest, Wallet, MINING_REWARD,
};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const DIFFICULTY: usize = 2;

fn transfer(
    ledger: &Ledger,
    sender: &Wallet,
    recipient: &Wallet,
    amount: Amount,
) -> Result<(), AuthError> {
    let tx = Transaction::new(sender.address().clone(), recipient.address().clone(), amount);
    let signature = tx.sign(sender).unwrap();
    ledger.submit_transaction(
        tx.sender_address,
        tx.recipient_address,
        tx.amount,
        &signature,
        sender.public_key(),
    )
}

#[test]
fn test_transfer_mine_and_query() {
    let miner = Wallet::new();
    let alice = Wallet::new();
    let bob = Wallet::new();
    let ledger = Ledger::with_difficulty(miner.address().clone(), DIFFICULTY);

    transfer(&ledger, &alice, &bob, Amount::from_coins(3)).unwrap();
    let block = ledger.mine().unwrap();

    assert_eq!(ledger.balance_of(bob.address()), Ok(Amount::from_coins(3)));
    assert_eq!(ledger.balance_of(alice.address()), Ok(Amount::from_coins(-3)));
    assert_eq!(ledger.balance_of(miner.address()), Ok(MINING_REWARD));

    let chain = ledger.chain_snapshot();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].prev_hash, genesis_prev_hash());
    assert_eq!(chain[1].prev_hash, chain[0].hash());
    assert!(meets_difficulty(&block.hash(), DIFFICULTY));
    assert!(block.hash_hex().starts_with("00"));
    assert!(is_valid_chain(&chain, DIFFICULTY));
}

#[test]
fn test_concurrent_submissions_land_in_one_block() {
    let miner = Wallet::new();
    let ledger = Ledger::with_difficulty(miner.address().clone(), 1);
    let recipient = Arc::new(Wallet::new());

    let handles: Vec<_> = (1..=8)
        .map(|coins| {
            let ledger = ledger.clone();
            let recipient = Arc::clone(&recipient);
            thread::spawn(move || {
                let sender = Wallet::new();
                let amount = Amount::from_coins(coins);
                transfer(&ledger, &sender, &recipient, amount).map(|_| sender.address().clone())
            })
        })
        .collect();

    let submitted: HashSet<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap())
        .collect();
    assert_eq!(submitted.len(), 8);

    let block = ledger.mine().unwrap();
    let senders: Vec<_> = block
        .transactions
        .iter()
        .filter(|tx| !tx.is_reward())
        .map(|tx| tx.sender_address.clone())
        .collect();

    assert_eq!(senders.len(), 8);
    assert_eq!(senders.iter().cloned().collect::<HashSet<_>>(), submitted);
    assert_eq!(block.transactions.iter().filter(|tx| tx.is_reward()).count(), 1);
    assert!(ledger.pending_transactions().is_empty());
    assert_eq!(ledger.balance_of(recipient.address()), Ok(Amount::from_coins(36)));
}

#[test]
fn test_submissions_during_mining_are_kept_exactly_once() {
    let miner = Wallet::new();
    let ledger = Ledger::with_difficulty(miner.address().clone(), 3);
    let recipient = Arc::new(Wallet::new());
    let stop = Arc::new(AtomicBool::new(false));

    let submitters: Vec<_> = (0..4)
        .map(|_| {
            let ledger = ledger.clone();
            let recipient = Arc::clone(&recipient);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let sender = Wallet::new();
                let mut accepted = Vec::new();
                let mut coins = 1;
                while !stop.load(Ordering::SeqCst) {
                    let amount = Amount::from_coins(coins);
                    transfer(&ledger, &sender, &recipient, amount).unwrap();
                    accepted.push((sender.address().clone(), amount));
                    coins += 1;
                }
                accepted
            })
        })
        .collect();

    // Mine several rounds while the submitters keep going
    let mut mined = 0;
    while mined < 3 {
        match ledger.mine() {
            Ok(_) => mined += 1,
            Err(MiningError::EmptyPool) => thread::yield_now(),
            Err(err) => panic!("mining failed: {}", err),
        }
    }
    stop.store(true, Ordering::SeqCst);

    let accepted: Vec<(Address, Amount)> = submitters
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();

    let chain = ledger.chain_snapshot();
    assert_eq!(chain.len(), 4);
    assert!(is_valid_chain(&chain, 3));

    let mut seen: Vec<(Address, Amount)> = Vec::new();
    for block in &chain[1..] {
        assert_eq!(block.transactions.iter().filter(|tx| tx.is_reward()).count(), 1);
        seen.extend(
            block
                .transactions
                .iter()
                .filter(|tx| !tx.is_reward())
                .map(|tx| (tx.sender_address.clone(), tx.amount)),
        );
    }
    seen.extend(
        ledger
            .pending_transactions()
            .into_iter()
            .map(|tx| (tx.sender_address, tx.amount)),
    );

    let unique: HashSet<_> = seen.iter().cloned().collect();
    assert_eq!(unique.len(), seen.len(), "a transaction was committed twice");
    assert_eq!(unique, accepted.into_iter().collect::<HashSet<_>>());
}

#[test]
fn test_negative_transfer_cannot_pull_funds() {
    let miner = Wallet::new();
    let mallory = Wallet::new();
    let victim = Wallet::new();
    let ledger = Ledger::with_difficulty(miner.address().clone(), 1);

    let result = transfer(&ledger, &mallory, &victim, -Amount::from_coins(100));
    assert_eq!(result, Err(AuthError::NegativeAmount(Amount::from_coins(-100))));

    assert_eq!(ledger.mine(), Err(MiningError::EmptyPool));
    assert_eq!(ledger.balance_of(mallory.address()), Ok(Amount::ZERO));
    assert_eq!(ledger.balance_of(victim.address()), Ok(Amount::ZERO));
}

#[test]
fn test_balance_beyond_range_is_reported() {
    let miner = Wallet::new();
    let alice = Wallet::new();
    let bob = Wallet::new();
    let ledger = Ledger::with_difficulty(miner.address().clone(), 1);
    let big: Amount = "5000000000000000000".parse().unwrap();

    transfer(&ledger, &alice, &bob, big).unwrap();
    transfer(&ledger, &alice, &bob, big).unwrap();
    ledger.mine().unwrap();

    assert!(matches!(
        ledger.balance_of(bob.address()),
        Err(AmountError::OutOfRange(_))
    ));
    assert!(matches!(
        ledger.balance_of(alice.address()),
        Err(AmountError::OutOfRange(_))
    ));
}

#[test]
fn test_wrong_signature_is_rejected() {
    let miner = Wallet::new();
    let alice = Wallet::new();
    let bob = Wallet::new();
    let ledger = Ledger::with_difficulty(miner.address().clone(), 1);

    // Bob's key signing a transfer out of Alice's address
    let tx = Transaction::new(
        alice.address().clone(),
        bob.address().clone(),
        Amount::from_coins(5),
    );
    let signature = bob.sign(&tx.canonical_bytes());
    let result = ledger.submit_transaction(
        tx.sender_address.clone(),
        tx.recipient_address.clone(),
        tx.amount,
        &signature,
        bob.public_key(),
    );
    assert_eq!(result, Err(AuthError::SenderMismatch));

    // Alice's key over different bytes
    let forged = alice.sign(b"something else");
    let result = ledger.submit_transaction(
        tx.sender_address,
        tx.recipient_address,
        tx.amount,
        &forged,
        alice.public_key(),
    );
    assert_eq!(result, Err(AuthError::InvalidSignature));

    assert!(ledger.pending_transactions().is_empty());
    assert_eq!(ledger.mine(), Err(MiningError::EmptyPool));
}

#[test]
fn test_empty_pool_leaves_chain_unchanged() {
    let miner = Wallet::new();
    let ledger = Ledger::with_difficulty(miner.address().clone(), DIFFICULTY);
    let before = ledger.chain_snapshot();

    assert_eq!(ledger.mine(), Err(MiningError::EmptyPool));
    assert_eq!(ledger.chain_snapshot(), before);
    assert_eq!(ledger.balance_of(miner.address()), Ok(Amount::ZERO));
}

#[test]
fn test_request_to_block() {
    let miner = Wallet::new();
    let alice = Wallet::new();
    let bob = Wallet::new();
    let ledger = Ledger::with_difficulty(miner.address().clone(), 1);

    let tx = Transaction::new(
        alice.address().clone(),
        bob.address().clone(),
        Amount::from_coins(2),
    );
    let signature = tx.sign(&alice).unwrap();
    let json = serde_json::json!({
        "sender_address": alice.address().as_str(),
        "recipient_address": bob.address().as_str(),
        "sender_public_key": alice.public_key_hex(),
        "amount": 2.0,
        "signature": signature.to_hex(),
    });

    let request: TransactionRequest = serde_json::from_value(json).unwrap();
    ledger.submit(request.decode().unwrap()).unwrap();
    ledger.mine().unwrap();

    assert_eq!(ledger.balance_of(bob.address()), Ok(Amount::from_coins(2)));
}

#[test]
fn test_chain_wire_round_trip() {
    let miner = Wallet::new();
    let alice = Wallet::new();
    let bob = Wallet::new();
    let ledger = Ledger::with_difficulty(miner.address().clone(), 1);

    transfer(&ledger, &alice, &bob, Amount::from_coins(4)).unwrap();
    ledger.mine().unwrap();
    transfer(&ledger, &bob, &alice, Amount::from_coins(1)).unwrap();
    ledger.mine().unwrap();

    let chain = ledger.chain_snapshot();
    let json = serde_json::to_string(&chain).unwrap();
    let decoded: Vec<Block> = serde_json::from_str(&json).unwrap();

    assert_eq!(decoded, chain);
    assert!(is_valid_chain(&decoded, 1));
    assert_eq!(
        decoded.iter().map(Block::hash).collect::<Vec<_>>(),
        chain.iter().map(Block::hash).collect::<Vec<_>>()
    );
}
