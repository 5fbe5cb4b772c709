//! Record extraction — pure transformation of one transaction tree of a raw
//! block into normalized row sets.
//!
//! No I/O happens here. Cross-references (vin/vout row IDs) are resolved
//! later by the ingestor once the store has assigned identifiers.

use crate::types::{
    AddressRow, RawBlock, RawTx, TxRow, TxTree, VinRow, VoutRow,
};

/// The row sets extracted from one transaction tree, indexed in parallel:
/// `vouts[i]`, `vins[i]`, and `address_rows[i]` belong to `txns[i]`.
#[derive(Debug, Clone, Default)]
pub struct ExtractedTree {
    pub txns: Vec<TxRow>,
    pub vouts: Vec<Vec<VoutRow>>,
    pub vins: Vec<Vec<VinRow>>,
    /// Funding-side ledger rows, one per (output, address) pair, with
    /// `matching_tx_hash` unset.
    pub address_rows: Vec<Vec<AddressRow>>,
}

impl ExtractedTree {
    /// Total number of inputs across all extracted transactions.
    pub fn num_vins(&self) -> u64 {
        self.vins.iter().map(|v| v.len() as u64).sum()
    }

    /// Total number of outputs across all extracted transactions.
    pub fn num_vouts(&self) -> u64 {
        self.vouts.iter().map(|v| v.len() as u64).sum()
    }
}

/// Extract the transactions, inputs, outputs, and funding address rows of one
/// tree of `block`, stamped with the given validity/mainchain flags.
///
/// Blocks accepted by the chain consumer are well-formed, so this cannot
/// fail; malformed input would indicate a bug upstream of the indexer.
pub fn extract_block_tree(
    block: &RawBlock,
    tree: TxTree,
    is_valid: bool,
    is_mainchain: bool,
) -> ExtractedTree {
    let raw_txns = block.tree(tree);
    let mut extracted = ExtractedTree {
        txns: Vec::with_capacity(raw_txns.len()),
        vouts: Vec::with_capacity(raw_txns.len()),
        vins: Vec::with_capacity(raw_txns.len()),
        address_rows: Vec::with_capacity(raw_txns.len()),
    };

    for (block_index, raw) in raw_txns.iter().enumerate() {
        extracted.txns.push(extract_txn(
            block,
            raw,
            block_index as u32,
            tree,
            is_valid,
            is_mainchain,
        ));
        extracted.vouts.push(extract_vouts(raw, tree));
        extracted.vins.push(extract_vins(raw, tree, is_valid, is_mainchain));
        extracted
            .address_rows
            .push(extract_funding_address_rows(block, raw, is_valid, is_mainchain));
    }

    extracted
}

fn extract_txn(
    block: &RawBlock,
    raw: &RawTx,
    block_index: u32,
    tree: TxTree,
    is_valid: bool,
    is_mainchain: bool,
) -> TxRow {
    TxRow {
        block_hash: block.header.hash.clone(),
        block_height: block.header.height,
        block_time: block.header.time,
        block_index,
        tree,
        tx_type: raw.tx_type,
        hash: raw.hash.clone(),
        num_vin: raw.inputs.len() as u32,
        num_vout: raw.outputs.len() as u32,
        sent: raw.sent(),
        vin_row_ids: Vec::new(),
        vout_row_ids: Vec::new(),
        is_valid,
        is_mainchain,
    }
}

fn extract_vouts(raw: &RawTx, tree: TxTree) -> Vec<VoutRow> {
    raw.outputs
        .iter()
        .enumerate()
        .map(|(index, out)| VoutRow {
            tx_hash: raw.hash.clone(),
            tx_index: index as u32,
            tx_tree: tree,
            value: out.value,
            script: out.script.clone(),
            addresses: out.addresses.clone(),
        })
        .collect()
}

fn extract_vins(raw: &RawTx, tree: TxTree, is_valid: bool, is_mainchain: bool) -> Vec<VinRow> {
    raw.inputs
        .iter()
        .enumerate()
        .map(|(index, vin)| VinRow {
            tx_hash: raw.hash.clone(),
            tx_index: index as u32,
            tx_tree: tree,
            tx_type: raw.tx_type,
            prev_tx_hash: vin.prev_hash.clone(),
            prev_tx_index: vin.prev_index,
            prev_tx_tree: vin.prev_tree,
            is_valid,
            is_mainchain,
        })
        .collect()
}

/// One funding ledger row per (output, address) pair. The matching (spending)
/// transaction hash is left unset; it is backfilled when the outpoint is
/// spent.
fn extract_funding_address_rows(
    block: &RawBlock,
    raw: &RawTx,
    is_valid: bool,
    is_mainchain: bool,
) -> Vec<AddressRow> {
    let mut rows = Vec::new();
    for (index, out) in raw.outputs.iter().enumerate() {
        for address in &out.addresses {
            rows.push(AddressRow {
                address: address.clone(),
                tx_hash: raw.hash.clone(),
                io_index: index as u32,
                is_funding: true,
                value: out.value,
                block_time: block.header.time,
                matching_tx_hash: None,
                valid_mainchain: is_valid && is_mainchain,
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockHeader, RawTxIn, RawTxOut, TxType, ZERO_HASH};

    fn sample_block() -> RawBlock {
        RawBlock {
            header: BlockHeader {
                height: 50,
                hash: "blk50".into(),
                prev_hash: "blk49".into(),
                time: 170_000,
                vote_bits: 1,
            },
            regular: vec![
                RawTx {
                    hash: "coinbase50".into(),
                    tx_type: TxType::Coinbase,
                    inputs: vec![RawTxIn {
                        prev_hash: ZERO_HASH.into(),
                        prev_index: u32::MAX,
                        prev_tree: TxTree::Regular,
                    }],
                    outputs: vec![RawTxOut {
                        value: 31_000,
                        script: "76a914".into(),
                        addresses: vec!["Dsmine".into()],
                    }],
                },
                RawTx {
                    hash: "spend50".into(),
                    tx_type: TxType::Ordinary,
                    inputs: vec![RawTxIn {
                        prev_hash: "coinbase49".into(),
                        prev_index: 0,
                        prev_tree: TxTree::Regular,
                    }],
                    outputs: vec![
                        RawTxOut {
                            value: 10_000,
                            script: "76a914".into(),
                            addresses: vec!["DsAlice".into()],
                        },
                        RawTxOut {
                            value: 20_000,
                            script: "76a914".into(),
                            addresses: vec!["DsBob".into(), "DsCarol".into()],
                        },
                    ],
                },
            ],
            stake: vec![RawTx {
                hash: "ticket50".into(),
                tx_type: TxType::Ticket,
                inputs: vec![RawTxIn {
                    prev_hash: "spend49".into(),
                    prev_index: 1,
                    prev_tree: TxTree::Regular,
                }],
                outputs: vec![RawTxOut {
                    value: 90_000,
                    script: "ba76a914".into(),
                    addresses: vec!["DsStaker".into()],
                }],
            }],
        }
    }

    #[test]
    fn extracts_regular_tree() {
        let block = sample_block();
        let tree = extract_block_tree(&block, TxTree::Regular, true, true);

        assert_eq!(tree.txns.len(), 2);
        assert_eq!(tree.num_vouts(), 3);
        assert_eq!(tree.num_vins(), 2);

        let spend = &tree.txns[1];
        assert_eq!(spend.block_index, 1);
        assert_eq!(spend.sent, 30_000);
        assert!(spend.is_valid && spend.is_mainchain);

        // Multi-address output yields one ledger row per address.
        assert_eq!(tree.address_rows[1].len(), 3);
        assert!(tree.address_rows[1].iter().all(|r| r.is_funding));
        assert!(tree.address_rows[1]
            .iter()
            .all(|r| r.matching_tx_hash.is_none()));
    }

    #[test]
    fn extracts_stake_tree_independently() {
        let block = sample_block();
        let tree = extract_block_tree(&block, TxTree::Stake, true, true);
        assert_eq!(tree.txns.len(), 1);
        assert_eq!(tree.txns[0].tx_type, TxType::Ticket);
        assert_eq!(tree.txns[0].tree, TxTree::Stake);
    }

    #[test]
    fn sidechain_flags_stamped() {
        let block = sample_block();
        let tree = extract_block_tree(&block, TxTree::Regular, true, false);
        assert!(tree.txns.iter().all(|t| !t.is_mainchain));
        assert!(tree.vins[1].iter().all(|v| !v.is_mainchain));
        assert!(tree.address_rows[1].iter().all(|r| !r.valid_mainchain));
    }

    #[test]
    fn extraction_is_deterministic() {
        let block = sample_block();
        let a = extract_block_tree(&block, TxTree::Regular, true, true);
        let b = extract_block_tree(&block, TxTree::Regular, true, true);
        assert_eq!(a.txns, b.txns);
        assert_eq!(a.vins, b.vins);
        assert_eq!(a.vouts, b.vouts);
    }
}
