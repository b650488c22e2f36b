//! Compiled contract artifacts and the providers that load them.

use std::path::{Path, PathBuf};

use alloy_core::{
    dyn_abi::{DynSolValue, JsonAbiExt, Specifier},
    json_abi::JsonAbi,
    primitives::{Bytes, hex},
};
use serde::Deserialize;

use crate::DeployError;

/// Directory holding Hardhat build-info files; never contains contract artifacts.
const BUILD_INFO_DIR: &str = "build-info";

/// Bytecode and ABI of a compiled contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    /// The contract name.
    pub name: String,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
    /// The contract ABI.
    pub abi: JsonAbi,
    /// Compiler version the artifact was built with, when known.
    pub compiler_version: Option<String>,
}

/// Source of compiled artifacts.
pub trait ArtifactProvider {
    /// Look up the artifact for `contract`, either a bare name or `source:Name`.
    fn get_artifact(&self, contract: &str) -> Result<ContractArtifact, DeployError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    contract_name: Option<String>,
    abi: JsonAbi,
    bytecode: RawBytecode,
}

/// Hardhat stores bytecode as a string, Foundry as `{ "object": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

impl RawBytecode {
    fn as_str(&self) -> &str {
        match self {
            RawBytecode::Hex(s) => s,
            RawBytecode::Object { object } => object,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    solc_version: String,
}

impl ContractArtifact {
    /// Parse a Hardhat or Foundry artifact.
    pub fn from_json(name: &str, content: &str) -> Result<Self, DeployError> {
        let raw: RawArtifact = serde_json::from_str(content).map_err(|e| {
            DeployError::InvalidArtifact(format!("failed to parse artifact for {}: {}", name, e))
        })?;

        let code = raw.bytecode.as_str().trim();
        let code = code.strip_prefix("0x").unwrap_or(code);

        // Library placeholders look like `__$<hash>$__`.
        if code.contains("__") {
            return Err(DeployError::InvalidArtifact(format!(
                "bytecode of {} contains unlinked library references",
                name
            )));
        }

        let bytecode = hex::decode(code).map_err(|e| {
            DeployError::InvalidArtifact(format!("bytecode of {} is not valid hex: {}", name, e))
        })?;

        Ok(Self {
            name: raw.contract_name.unwrap_or_else(|| name.to_string()),
            bytecode: bytecode.into(),
            abi: raw.abi,
            compiler_version: None,
        })
    }

    /// Number of parameters the constructor declares (zero when the ABI has none).
    pub fn constructor_arity(&self) -> usize {
        self.abi
            .constructor
            .as_ref()
            .map_or(0, |constructor| constructor.inputs.len())
    }

    /// Coerce textual arguments into ABI values using the constructor's parameter types.
    pub fn parse_args(&self, raw: &[String]) -> Result<Vec<DynSolValue>, DeployError> {
        self.check_arity(raw.len())?;

        let Some(constructor) = &self.abi.constructor else {
            return Ok(Vec::new());
        };

        constructor
            .inputs
            .iter()
            .zip(raw)
            .map(|(param, value)| {
                let ty = param.resolve().map_err(|e| {
                    DeployError::InvalidArtifact(format!(
                        "unsupported constructor parameter `{}`: {}",
                        param.name, e
                    ))
                })?;
                ty.coerce_str(value).map_err(|e| {
                    DeployError::InvalidArtifact(format!(
                        "argument `{}` is not a valid {} for `{}`: {}",
                        value, ty, param.name, e
                    ))
                })
            })
            .collect()
    }

    /// Build the creation payload: bytecode followed by the ABI-encoded constructor arguments.
    pub fn deploy_code(&self, args: &[DynSolValue]) -> Result<Bytes, DeployError> {
        self.check_arity(args.len())?;

        let Some(constructor) = &self.abi.constructor else {
            return Ok(self.bytecode.clone());
        };

        let encoded = constructor.abi_encode_input(args).map_err(|e| {
            DeployError::InvalidArtifact(format!(
                "constructor arguments do not match the ABI of {}: {}",
                self.name, e
            ))
        })?;

        let mut code = Vec::with_capacity(self.bytecode.len() + encoded.len());
        code.extend_from_slice(&self.bytecode);
        code.extend_from_slice(&encoded);
        Ok(code.into())
    }

    fn check_arity(&self, given: usize) -> Result<(), DeployError> {
        let expected = self.constructor_arity();
        if given != expected {
            return Err(DeployError::InvalidArtifact(format!(
                "constructor of {} expects {} argument(s), got {}",
                self.name, expected, given
            )));
        }
        Ok(())
    }
}

/// Reads artifacts produced by `hardhat compile` or `forge build`.
#[derive(Debug, Clone)]
pub struct HardhatArtifacts {
    root: PathBuf,
}

impl HardhatArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_path(&self, contract: &str) -> Result<PathBuf, DeployError> {
        if let Some((source, name)) = contract.rsplit_once(':') {
            let file_name = format!("{}.json", name);
            let hardhat = self.root.join(source).join(&file_name);
            if hardhat.is_file() {
                return Ok(hardhat);
            }
            // Foundry drops the source directory: out/<File>.sol/<Name>.json
            if let Some(base) = Path::new(source).file_name() {
                let foundry = self.root.join(base).join(&file_name);
                if foundry.is_file() {
                    return Ok(foundry);
                }
            }
            return Err(DeployError::InvalidArtifact(format!(
                "no artifact for {} under {}",
                contract,
                self.root.display()
            )));
        }

        let mut matches = Vec::new();
        find_artifact_files(&self.root, contract, &mut matches).map_err(|e| {
            DeployError::InvalidArtifact(format!(
                "failed to read artifacts directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        match matches.len() {
            0 => Err(DeployError::InvalidArtifact(format!(
                "no artifact named {} under {} (did you compile?)",
                contract,
                self.root.display()
            ))),
            1 => Ok(matches.remove(0)),
            _ => {
                let candidates: Vec<String> =
                    matches.iter().map(|p| p.display().to_string()).collect();
                Err(DeployError::InvalidArtifact(format!(
                    "{} is ambiguous, use a fully qualified name; candidates: {}",
                    contract,
                    candidates.join(", ")
                )))
            }
        }
    }

    /// Read `solcVersion` from the build-info referenced by the Hardhat debug file.
    fn compiler_version(artifact_path: &Path) -> Option<String> {
        let dbg_path = artifact_path.with_extension("dbg.json");
        let dbg: DebugFile = serde_json::from_str(&std::fs::read_to_string(&dbg_path).ok()?).ok()?;
        let build_info_path = dbg_path.parent()?.join(dbg.build_info);
        let build_info: BuildInfo =
            serde_json::from_str(&std::fs::read_to_string(build_info_path).ok()?).ok()?;
        Some(build_info.solc_version)
    }
}

impl ArtifactProvider for HardhatArtifacts {
    fn get_artifact(&self, contract: &str) -> Result<ContractArtifact, DeployError> {
        let path = self.resolve_path(contract)?;
        let name = contract.rsplit(':').next().unwrap_or(contract);

        let content = std::fs::read_to_string(&path).map_err(|e| {
            DeployError::InvalidArtifact(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut artifact = ContractArtifact::from_json(name, &content)?;
        artifact.compiler_version = Self::compiler_version(&path);

        tracing::debug!(
            contract = %artifact.name,
            path = %path.display(),
            bytecode_len = artifact.bytecode.len(),
            compiler_version = ?artifact.compiler_version,
            "Loaded contract artifact"
        );

        Ok(artifact)
    }
}

fn find_artifact_files(dir: &Path, name: &str, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let file_name = format!("{}.json", name);

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|n| n == BUILD_INFO_DIR) {
                continue;
            }
            find_artifact_files(&path, name, out)?;
        } else if path.file_name().is_some_and(|n| n == file_name.as_str()) {
            out.push(path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{Address, U256};
    use tempdir::TempDir;

    use super::*;

    const OWNED_ABI: &str = r#"[
        {
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [
                { "name": "owner", "type": "address", "internalType": "address" },
                { "name": "threshold", "type": "uint256", "internalType": "uint256" }
            ]
        }
    ]"#;

    fn hardhat_json(name: &str, abi: &str, bytecode: &str) -> String {
        format!(
            r#"{{
                "_format": "hh-sol-artifact-1",
                "contractName": "{name}",
                "sourceName": "contracts/{name}.sol",
                "abi": {abi},
                "bytecode": "{bytecode}",
                "deployedBytecode": "0x",
                "linkReferences": {{}},
                "deployedLinkReferences": {{}}
            }}"#
        )
    }

    #[test]
    fn test_parse_hardhat_artifact() {
        let json = hardhat_json("FactoryMulisigWallet", "[]", "0x600160020155");
        let artifact = ContractArtifact::from_json("FactoryMulisigWallet", &json).unwrap();

        assert_eq!(artifact.name, "FactoryMulisigWallet");
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x01, 0x60, 0x02, 0x01, 0x55]);
        assert_eq!(artifact.constructor_arity(), 0);
    }

    #[test]
    fn test_parse_foundry_artifact() {
        let json = r#"{ "abi": [], "bytecode": { "object": "0x6001", "linkReferences": {} } }"#;
        let artifact = ContractArtifact::from_json("Counter", json).unwrap();

        assert_eq!(artifact.name, "Counter");
        assert_eq!(artifact.bytecode.len(), 2);
    }

    #[test]
    fn test_interface_artifact_has_empty_bytecode() {
        let json = hardhat_json("IWallet", "[]", "0x");
        let artifact = ContractArtifact::from_json("IWallet", &json).unwrap();
        assert!(artifact.bytecode.is_empty());
    }

    #[test]
    fn test_unlinked_library_rejected() {
        let json = hardhat_json(
            "Wallet",
            "[]",
            "0x6001__$b8a4a4d5f1e4e3b8a9c0d3e2f1a0b9c8d7$__6002",
        );
        let err = ContractArtifact::from_json("Wallet", &json).unwrap_err();
        assert!(matches!(err, DeployError::InvalidArtifact(msg) if msg.contains("unlinked")));
    }

    #[test]
    fn test_parse_and_encode_constructor_args() {
        let json = hardhat_json("Owned", OWNED_ABI, "0x6001");
        let artifact = ContractArtifact::from_json("Owned", &json).unwrap();

        let args = artifact
            .parse_args(&[
                "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
                "2".to_string(),
            ])
            .unwrap();

        assert_eq!(
            args,
            vec![
                DynSolValue::Address(
                    "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
                        .parse::<Address>()
                        .unwrap()
                ),
                DynSolValue::Uint(U256::from(2), 256),
            ]
        );

        let code = artifact.deploy_code(&args).unwrap();
        // 2 bytes of bytecode followed by two 32-byte words.
        assert_eq!(code.len(), 2 + 64);
        assert_eq!(&code[..2], &[0x60, 0x01]);
        assert_eq!(code[code.len() - 1], 2);
    }

    #[test]
    fn test_constructor_arity_mismatch() {
        let json = hardhat_json("Owned", OWNED_ABI, "0x6001");
        let artifact = ContractArtifact::from_json("Owned", &json).unwrap();

        let err = artifact.parse_args(&["0x01".to_string()]).unwrap_err();
        assert!(matches!(err, DeployError::InvalidArtifact(msg) if msg.contains("expects 2")));

        let err = artifact.deploy_code(&[]).unwrap_err();
        assert!(matches!(err, DeployError::InvalidArtifact(_)));
    }

    #[test]
    fn test_constructor_type_mismatch() {
        let json = hardhat_json("Owned", OWNED_ABI, "0x6001");
        let artifact = ContractArtifact::from_json("Owned", &json).unwrap();

        let err = artifact
            .parse_args(&["not-an-address".to_string(), "2".to_string()])
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidArtifact(_)));

        let wrong = [DynSolValue::Bool(true), DynSolValue::Bool(false)];
        assert!(artifact.deploy_code(&wrong).is_err());
    }

    #[test]
    fn test_provider_finds_artifact_and_compiler_version() {
        let dir = TempDir::new("kiln-artifacts").unwrap();
        let contract_dir = dir.path().join("contracts/Factory.sol");
        let build_info_dir = dir.path().join("build-info");
        std::fs::create_dir_all(&contract_dir).unwrap();
        std::fs::create_dir_all(&build_info_dir).unwrap();

        std::fs::write(
            contract_dir.join("FactoryMulisigWallet.json"),
            hardhat_json("FactoryMulisigWallet", "[]", "0x600160020155"),
        )
        .unwrap();
        std::fs::write(
            contract_dir.join("FactoryMulisigWallet.dbg.json"),
            r#"{ "_format": "hh-sol-dbg-1", "buildInfo": "../../build-info/abc.json" }"#,
        )
        .unwrap();
        std::fs::write(
            build_info_dir.join("abc.json"),
            r#"{ "_format": "hh-sol-build-info-1", "solcVersion": "0.8.19" }"#,
        )
        .unwrap();

        let provider = HardhatArtifacts::new(dir.path());

        let artifact = provider.get_artifact("FactoryMulisigWallet").unwrap();
        assert_eq!(artifact.compiler_version.as_deref(), Some("0.8.19"));

        let qualified = provider
            .get_artifact("contracts/Factory.sol:FactoryMulisigWallet")
            .unwrap();
        assert_eq!(qualified.bytecode, artifact.bytecode);
    }

    #[test]
    fn test_provider_ambiguous_and_missing() {
        let dir = TempDir::new("kiln-artifacts").unwrap();
        for source in ["contracts/A.sol", "contracts/B.sol"] {
            let path = dir.path().join(source);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(path.join("Wallet.json"), hardhat_json("Wallet", "[]", "0x01")).unwrap();
        }

        let provider = HardhatArtifacts::new(dir.path());

        let err = provider.get_artifact("Wallet").unwrap_err();
        assert!(matches!(err, DeployError::InvalidArtifact(msg) if msg.contains("ambiguous")));

        let err = provider.get_artifact("Missing").unwrap_err();
        assert!(matches!(err, DeployError::InvalidArtifact(msg) if msg.contains("no artifact")));

        assert!(provider.get_artifact("contracts/A.sol:Wallet").is_ok());
    }
}
