//! Static registry of Stellar assets the bridge can move

use serde::Serialize;

/// Chain-specific description of a bridgeable token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenDescriptor {
    pub code: &'static str,
    pub display_name: &'static str,
    /// Classic asset issuer account, if the token exists as a classic asset
    pub issuer: Option<&'static str>,
    /// Soroban contract id
    pub contract: Option<&'static str>,
    pub is_native: bool,
}

const TOKENS: &[TokenDescriptor] = &[
    TokenDescriptor {
        code: "XLM",
        display_name: "Stellar Lumens",
        issuer: None,
        contract: Some("CAS3J7GYLGXMF6TDJBBYYSE3HQ6BBSMLNUQ34T6TZMYMW2EVH34XOWMA"),
        is_native: true,
    },
    TokenDescriptor {
        code: "DBTK",
        display_name: "DBTK Token",
        issuer: Some("GCXOBFWSCCEVETJD4RODO465BRTVHHZKYBA6QXHJTSGOWDUE33LOJVCO"),
        contract: Some("CDVMWOSNI7VRZTGILOGJXCGJ3URUENAGBCBKAZUVKGN7D4TMS77Y4E4X"),
        is_native: false,
    },
    TokenDescriptor {
        code: "BUCK",
        display_name: "BUCK Token",
        issuer: Some("GDZGJY4YNJVU34BJCKASDMV735EBUDCI5F52BQVB2LDMFYGZBZN7X2B4"),
        contract: Some("CBCR3AQSSYV2GWOQHSQ6HIFQYWOZTOPZT4JRQY5AIRZKMHET5UBD4WQA"),
        is_native: false,
    },
    TokenDescriptor {
        code: "DIME",
        display_name: "DIME Token",
        issuer: Some("GCFB3RNT7VRO2IYX4QHISAOTK2FRJLR4MZLTZC4JRX37NRINLP5CBUNJ"),
        contract: Some("CDSJPARJXWJB4LUSGHL26LPWNCGUXTJ5VVKUR27WEDPPKJUIOIMCUKUZ"),
        is_native: false,
    },
    TokenDescriptor {
        code: "DGBP",
        display_name: "DGBP Token",
        issuer: Some("GBI7OH3AQ4AA2CBYJVPN6EIWV3GJPAVUVDNF3I7XPFVPOJBWK7LRI6BH"),
        contract: None,
        is_native: false,
    },
    TokenDescriptor {
        code: "USDC",
        display_name: "USD Coin",
        issuer: None,
        contract: Some("CCW67TSZV3SSS2HXMBQ5JFGCKJNXKZM7UQUWUZPUTHXSTZLEO7SJMI75"),
        is_native: false,
    },
    TokenDescriptor {
        code: "PYPL",
        display_name: "PYPL Token",
        issuer: None,
        contract: None,
        is_native: false,
    },
    TokenDescriptor {
        code: "JPMD",
        display_name: "JPMD Token",
        issuer: None,
        contract: None,
        is_native: false,
    },
];

/// Look up a token by its code (exact match)
pub fn lookup(code: &str) -> Option<&'static TokenDescriptor> {
    TOKENS.iter().find(|t| t.code == code)
}

/// All registered tokens, in display order
pub fn all() -> &'static [TokenDescriptor] {
    TOKENS
}
