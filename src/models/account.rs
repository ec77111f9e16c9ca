//! Account state pushed by the server: balance and asset payouts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `successupdateBalance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub balance: Decimal,
    #[serde(default)]
    pub is_demo: Option<u8>,
}

/// One row of the `updateAssets` table.
///
/// The server sends each asset as a positional array,
/// `[id, symbol, name, type, group, payout, ...]`; only the leading fields
/// are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>")]
pub struct Asset {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    /// Payout in percent of the stake.
    pub payout: u32,
}

impl TryFrom<Vec<Value>> for Asset {
    type Error = String;

    fn try_from(row: Vec<Value>) -> Result<Self, Self::Error> {
        let field = |index: usize| {
            row.get(index)
                .ok_or_else(|| format!("asset row has no field {index}"))
        };
        let text = |index: usize| {
            field(index)?
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("asset field {index} is not a string"))
        };

        Ok(Self {
            id: field(0)?
                .as_i64()
                .ok_or("asset id is not an integer")?,
            symbol: text(1)?,
            name: text(2)?,
            payout: field(5)?
                .as_u64()
                .and_then(|p| u32::try_from(p).ok())
                .ok_or("asset payout is not a percentage")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn balance_deserializes() {
        let balance: Balance = serde_json::from_str(r#"{"isDemo":1,"balance":50000.25}"#).unwrap();
        assert_eq!(balance.balance, dec!(50000.25));
        assert_eq!(balance.is_demo, Some(1));
    }

    #[test]
    fn asset_rows_deserialize_positionally() {
        let assets: Vec<Asset> = serde_json::from_str(
            r##"[[5,"#AAPL","Apple","stock",2,50,60,30,3,0,170,0,[],1743724800,false,[],0,true],
                [66,"EURUSD_otc","EUR/USD OTC","currency",1,92,60,30,3,1,50,0,[],0,true]]"##,
        )
        .unwrap();
        assert_eq!(assets[0].symbol, "#AAPL");
        assert_eq!(assets[1].id, 66);
        assert_eq!(assets[1].payout, 92);
    }

    #[test]
    fn short_asset_row_is_rejected() {
        assert!(serde_json::from_str::<Asset>(r##"[5,"#AAPL","Apple"]"##).is_err());
    }
}
