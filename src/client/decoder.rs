use alloy::primitives::{Address, U256};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;

use crate::error::{IndexerError, Result};

// Minimal ABI for the fee collector contract. Only the event topic and
// data layout matter here; the typed decoder comes from alloy's sol! macro.
sol! {
    event FeesCollected(address indexed token, address indexed integrator, uint256 integratorFee, uint256 lifiFee);
}

/// Decoded FeesCollected payload before block enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFee {
    pub token: Address,
    pub integrator: Address,
    pub integrator_fee: U256,
    pub lifi_fee: U256,
}

/// Decode a raw log as a FeesCollected event.
///
/// Fails with `Decode` if the topic or data shape does not match. The log
/// filter should preclude unrelated logs, so a mismatch here is worth a
/// warning upstream.
pub fn decode_fee_log(log: &Log) -> Result<DecodedFee> {
    let inner = &log.inner;
    let topics = inner.data.topics();

    if topics.is_empty() || topics[0] != FeesCollected::SIGNATURE_HASH {
        return Err(IndexerError::Decode(
            "topic0 does not match FeesCollected signature".to_string(),
        ));
    }
    if topics.len() != 3 {
        return Err(IndexerError::Decode(format!(
            "expected 3 topics, found {}",
            topics.len()
        )));
    }

    let token = Address::from_word(topics[1]);
    let integrator = Address::from_word(topics[2]);

    let data = inner.data.data.as_ref();
    if data.len() < 64 {
        return Err(IndexerError::Decode(format!(
            "expected 64 bytes of data, found {}",
            data.len()
        )));
    }

    let integrator_fee = U256::from_be_slice(&data[..32]);
    let lifi_fee = U256::from_be_slice(&data[32..64]);

    Ok(DecodedFee {
        token,
        integrator,
        integrator_fee,
        lifi_fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, LogData, B256};
    use std::str::FromStr;

    fn fee_log(token: Address, integrator: Address, integrator_fee: U256, lifi_fee: U256) -> Log {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&integrator_fee.to_be_bytes::<32>());
        data.extend_from_slice(&lifi_fee.to_be_bytes::<32>());

        let inner = alloy::primitives::Log {
            address: Address::from_str("0xbd6c7b0d2f68c2b7805d88388319cfb6ecb50ea9").unwrap(),
            data: LogData::new_unchecked(
                vec![
                    FeesCollected::SIGNATURE_HASH,
                    token.into_word(),
                    integrator.into_word(),
                ],
                Bytes::from(data),
            ),
        };

        Log {
            inner,
            block_number: Some(70_000_250),
            block_hash: Some(B256::repeat_byte(0xbb)),
            transaction_hash: Some(B256::repeat_byte(0xaa)),
            log_index: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_fee_log() {
        let token = Address::repeat_byte(0x11);
        let integrator = Address::repeat_byte(0x22);
        let integrator_fee = U256::from_str("1000000000000000000").unwrap();
        let lifi_fee = U256::from_str("500000000000000000").unwrap();

        let log = fee_log(token, integrator, integrator_fee, lifi_fee);
        let decoded = decode_fee_log(&log).unwrap();

        assert_eq!(decoded.token, token);
        assert_eq!(decoded.integrator, integrator);
        assert_eq!(decoded.integrator_fee, integrator_fee);
        assert_eq!(decoded.lifi_fee, lifi_fee);
    }

    #[test]
    fn test_fee_strings_survive_round_trip() {
        // uint256 values leave the decoder only via to_string; no loss,
        // no sign, no leading zeros.
        let fee = U256::from_str("340282366920938463463374607431768211455").unwrap();
        let log = fee_log(
            Address::repeat_byte(0x11),
            Address::repeat_byte(0x22),
            fee,
            U256::ZERO,
        );
        let decoded = decode_fee_log(&log).unwrap();
        assert_eq!(
            decoded.integrator_fee.to_string(),
            "340282366920938463463374607431768211455"
        );
        assert_eq!(decoded.lifi_fee.to_string(), "0");
    }

    #[test]
    fn test_decode_rejects_wrong_signature() {
        let mut log = fee_log(
            Address::repeat_byte(0x11),
            Address::repeat_byte(0x22),
            U256::from(1),
            U256::from(2),
        );
        let topics = vec![
            B256::repeat_byte(0xde),
            Address::repeat_byte(0x11).into_word(),
            Address::repeat_byte(0x22).into_word(),
        ];
        log.inner.data = LogData::new_unchecked(topics, log.inner.data.data.clone());

        assert!(matches!(
            decode_fee_log(&log),
            Err(IndexerError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_short_data() {
        let mut log = fee_log(
            Address::repeat_byte(0x11),
            Address::repeat_byte(0x22),
            U256::from(1),
            U256::from(2),
        );
        log.inner.data = LogData::new_unchecked(
            log.inner.data.topics().to_vec(),
            Bytes::from(vec![0u8; 32]),
        );

        assert!(matches!(
            decode_fee_log(&log),
            Err(IndexerError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_indexed_topics() {
        let mut log = fee_log(
            Address::repeat_byte(0x11),
            Address::repeat_byte(0x22),
            U256::from(1),
            U256::from(2),
        );
        log.inner.data = LogData::new_unchecked(
            vec![FeesCollected::SIGNATURE_HASH],
            log.inner.data.data.clone(),
        );

        assert!(matches!(
            decode_fee_log(&log),
            Err(IndexerError::Decode(_))
        ));
    }
}
