//! Binary artifact codec.

use thiserror::Error;

use super::results::{MutationCoverageMap, TestResultsBatch};

/// Artifact encode/decode failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Bytes did not decode into the expected record.
    #[error("artifact decode failed: {0}")]
    Decode(#[source] bincode::Error),
    /// Record could not be encoded.
    #[error("artifact encode failed: {0}")]
    Encode(#[source] bincode::Error),
}

/// Decodes artifacts written by the test host.
pub trait ResultCodec: Send + Sync {
    /// Decode a test-execution artifact.
    fn decode_results(&self, bytes: &[u8]) -> Result<TestResultsBatch, CodecError>;

    /// Decode a coverage artifact.
    fn decode_coverage(&self, bytes: &[u8]) -> Result<MutationCoverageMap, CodecError>;
}

/// Bincode wire format shared with the host-side data collectors.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl BincodeCodec {
    /// Encode a results batch the way the host's collector writes it.
    pub fn encode_results(&self, batch: &TestResultsBatch) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(batch).map_err(CodecError::Encode)
    }

    /// Encode a coverage map the way the host's collector writes it.
    pub fn encode_coverage(&self, coverage: &MutationCoverageMap) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(coverage).map_err(CodecError::Encode)
    }
}

impl ResultCodec for BincodeCodec {
    fn decode_results(&self, bytes: &[u8]) -> Result<TestResultsBatch, CodecError> {
        bincode::deserialize(bytes).map_err(CodecError::Decode)
    }

    fn decode_coverage(&self, bytes: &[u8]) -> Result<MutationCoverageMap, CodecError> {
        bincode::deserialize(bytes).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::results::{CoverageEntry, TestOutcome, TestResult};

    #[test]
    fn results_artifact_decodes_in_order() {
        let codec = BincodeCodec;
        let batch: TestResultsBatch = [
            TestResult::new("Suite.First", TestOutcome::Passed),
            TestResult::new("Suite.Second", TestOutcome::Crashed),
        ]
        .into_iter()
        .collect();

        let bytes = codec.encode_results(&batch).expect("batch should encode");
        let decoded = codec.decode_results(&bytes).expect("batch should decode");
        let names: Vec<&str> = decoded.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Suite.First", "Suite.Second"]);
        assert_eq!(decoded, batch);
    }

    #[test]
    fn coverage_artifact_decodes() {
        let codec = BincodeCodec;
        let mut coverage = MutationCoverageMap::new();
        coverage.register("Suite.First", CoverageEntry::new("Lib.dll", 7));

        let bytes = codec.encode_coverage(&coverage).expect("coverage should encode");
        let decoded = codec.decode_coverage(&bytes).expect("coverage should decode");
        assert_eq!(decoded.covered_by("Suite.First"), &[CoverageEntry::new("Lib.dll", 7)]);
    }

    #[test]
    fn truncated_artifact_is_rejected() {
        let codec = BincodeCodec;
        let batch: TestResultsBatch = [TestResult::new("Suite.First", TestOutcome::Passed)]
            .into_iter()
            .collect();
        let bytes = codec.encode_results(&batch).expect("batch should encode");

        let err = codec
            .decode_results(&bytes[..bytes.len() - 3])
            .expect_err("truncated artifact should not decode");
        assert!(matches!(err, CodecError::Decode(_)));
        assert!(codec.decode_coverage(b"\xff\xff").is_err());
    }
}
