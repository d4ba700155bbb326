//! Kraken spot REST adapter.
//!
//! Wire strings are converted into the domain enums here; nothing
//! Kraken-specific leaks past this module.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::core::{
    AssetBalance, AssetPairInfo, Error, Order, OrderStatus, PairBalances, Result, Side,
    truncate_to_scale,
};
use crate::exchange::types::{AmountKind, CreateOrderResponse, OrderRequest};
use crate::exchange::ExchangeRest;

const BASE_URL: &str = "https://api.kraken.com";

/// Kraken REST client with HMAC-SHA512 request signing.
pub struct KrakenRest {
    http: Client,
    api_public_key: String,
    api_secret_key: String,
    last_nonce: AtomicU64,
}

impl KrakenRest {
    pub fn new(api_public_key: impl Into<String>, api_secret_key: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_public_key: api_public_key.into(),
            api_secret_key: api_secret_key.into(),
            last_nonce: AtomicU64::new(0),
        }
    }

    /// Strictly increasing millisecond nonce.
    fn nonce(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.last_nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .map(|last| now.max(last + 1))
            .unwrap_or(now)
    }

    fn public(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{BASE_URL}{path}");
        let response: Value = self.http.get(url).query(query).send()?.json()?;
        unwrap_envelope(response)
    }

    fn private(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let nonce = self.nonce().to_string();
        let mut form: Vec<(&str, String)> = vec![("nonce", nonce.clone())];
        form.extend(params.iter().cloned());
        let post_data = encode_form(&form);
        let signature = sign(&self.api_secret_key, path, &nonce, &post_data)?;

        let response: Value = self
            .http
            .post(format!("{BASE_URL}{path}"))
            .header("API-Key", &self.api_public_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(post_data)
            .send()?
            .json()?;
        unwrap_envelope(response)
    }

    /// Issue a token for the authenticated websocket channels.
    pub fn websocket_token(&self) -> Result<String> {
        let result = self.private("/0/private/GetWebSocketsToken", &[])?;
        result["token"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::Exchange("GetWebSocketsToken returned no token".into()))
    }

    fn closed_orders(&self) -> Result<Value> {
        self.private("/0/private/ClosedOrders", &[("trades", "true".into())])
    }
}

impl ExchangeRest for KrakenRest {
    fn system_status(&self) -> Result<String> {
        let result = self.public("/0/public/SystemStatus", &[])?;
        Ok(result["status"].as_str().unwrap_or_default().to_lowercase())
    }

    fn asset_pair_info(&self, base: &str, quote: &str) -> Result<AssetPairInfo> {
        let pair = format!("{}/{}", base.to_uppercase(), quote.to_uppercase());
        let result = self.public("/0/public/AssetPairs", &[("pair", &pair)])?;
        let entry = result
            .as_object()
            .and_then(|map| map.values().next())
            .ok_or_else(|| Error::Exchange(format!("no asset pair info for {pair}")))?;
        pair_info_from_wire(entry)
    }

    fn balances(&self) -> Result<Vec<AssetBalance>> {
        debug!("Retrieving the account balances...");
        let result = self.private("/0/private/BalanceEx", &[])?;
        let map = result
            .as_object()
            .ok_or_else(|| Error::Exchange("BalanceEx returned no object".into()))?;
        let mut balances = Vec::with_capacity(map.len());
        for (asset, data) in map {
            balances.push(AssetBalance {
                asset: asset.clone(),
                balance: decimal_field(data, "balance")?,
                hold_trade: decimal_field(data, "hold_trade")?,
            });
        }
        Ok(balances)
    }

    fn pair_balance(&self, pair: &AssetPairInfo) -> Result<PairBalances> {
        let mut balances = PairBalances::default();
        for balance in self.balances()? {
            if balance.asset == pair.base {
                balances.base_balance = balance.balance;
                balances.base_available = balance.balance - balance.hold_trade;
            } else if balance.asset == pair.quote {
                balances.quote_balance = balance.balance;
                balances.quote_available = balance.balance - balance.hold_trade;
            }
        }
        Ok(balances)
    }

    fn create_order(&self, request: &OrderRequest) -> Result<CreateOrderResponse> {
        let mut params: Vec<(&str, String)> = vec![
            ("ordertype", "limit".into()),
            ("type", request.side.as_str().into()),
            ("pair", request.symbol.clone()),
            ("price", request.price.to_string()),
            ("volume", request.volume.to_string()),
            ("userref", request.userref.to_string()),
        ];
        if request.validate {
            params.push(("validate", "true".into()));
        }
        if request.post_only {
            params.push(("oflags", "post".into()));
        }
        let result = self.private("/0/private/AddOrder", &params)?;
        let txid = result["txid"]
            .as_array()
            .and_then(|txids| txids.first())
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::Exchange("AddOrder returned no txid".into()))?;
        Ok(CreateOrderResponse { txid })
    }

    fn cancel_order(&self, txid: &str) -> Result<()> {
        self.private("/0/private/CancelOrder", &[("txid", txid.into())])?;
        Ok(())
    }

    fn cancel_all_orders(&self) -> Result<()> {
        self.private("/0/private/CancelAll", &[])?;
        Ok(())
    }

    fn get_order(&self, txid: &str) -> Result<Option<Order>> {
        let result = self.private("/0/private/QueryOrders", &[("txid", txid.into())]);
        let result = match result {
            Err(Error::UnknownOrder(_)) => return Ok(None),
            other => other?,
        };
        match result.get(txid) {
            Some(entry) => Ok(Some(order_from_wire(txid, entry)?)),
            None => Ok(None),
        }
    }

    fn open_orders(&self, userref: i64) -> Result<Vec<Order>> {
        let result = self.private("/0/private/OpenOrders", &[("userref", userref.to_string())])?;
        let open = result["open"]
            .as_object()
            .cloned()
            .unwrap_or_default();
        let mut orders = Vec::with_capacity(open.len());
        for (txid, entry) in &open {
            orders.push(order_from_wire(txid, entry)?);
        }
        Ok(orders)
    }

    fn truncate(&self, amount: Decimal, kind: AmountKind, pair: &AssetPairInfo) -> Decimal {
        let scale = match kind {
            AmountKind::Price => pair.pair_decimals,
            AmountKind::Volume => pair.lot_decimals,
        };
        truncate_to_scale(amount, scale)
    }

    fn check_api_key_permissions(&self) -> Result<()> {
        info!("- Checking permissions of API keys...");

        info!(" - Checking if 'Query Funds' permission is set...");
        self.balances().map_err(auth_required)?;

        info!(" - Checking if 'Query open orders & trades' permission is set...");
        self.open_orders(0).map_err(auth_required)?;

        info!(" - Checking if 'Query closed orders & trades' permission is set...");
        self.closed_orders().map_err(auth_required)?;

        info!(" - Checking if 'Create & modify orders' permission is set...");
        self.create_order(&OrderRequest {
            side: Side::Buy,
            symbol: "XBT/USD".into(),
            price: Decimal::TEN,
            volume: Decimal::TEN,
            userref: 0,
            validate: true,
            post_only: false,
        })
        .map_err(auth_required)?;

        info!(" - Checking if 'Cancel & close orders' permission is set...");
        match self.private(
            "/0/private/CancelOrder",
            &[("cl_ord_id", "weir-permission-probe".into())],
        ) {
            Ok(_) | Err(Error::UnknownOrder(_)) | Err(Error::Exchange(_)) => {}
            Err(other) => return Err(auth_required(other)),
        }

        info!(" - Checking if 'Websocket interface' permission is set...");
        self.websocket_token().map_err(auth_required)?;

        info!(" - API keys and permissions are valid!");
        Ok(())
    }
}

fn auth_required(err: Error) -> Error {
    match err {
        Error::Auth(_) => err,
        other => Error::Auth(format!("API key check failed: {other}")),
    }
}

/// Compute the `API-Sign` header: HMAC-SHA512 over
/// `path + SHA256(nonce + post_data)` keyed with the base64-decoded
/// secret.
fn sign(secret: &str, path: &str, nonce: &str, post_data: &str) -> Result<String> {
    let secret = BASE64
        .decode(secret)
        .map_err(|err| Error::Auth(format!("API secret is not valid base64: {err}")))?;

    let mut sha = Sha256::new();
    sha.update(nonce.as_bytes());
    sha.update(post_data.as_bytes());
    let digest = sha.finalize();

    let mut mac = Hmac::<Sha512>::new_from_slice(&secret)
        .map_err(|err| Error::Auth(format!("invalid API secret length: {err}")))?;
    mac.update(path.as_bytes());
    mac.update(&digest);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn encode_form(form: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in form {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Unwrap the `{error: [...], result: {...}}` envelope into the result,
/// classifying Kraken error codes into domain errors.
fn unwrap_envelope(response: Value) -> Result<Value> {
    let errors: Vec<String> = response["error"]
        .as_array()
        .map(|errs| {
            errs.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    if errors.is_empty() {
        return Ok(response["result"].clone());
    }
    let joined = errors.join(", ");
    if errors
        .iter()
        .any(|e| e.contains("Unknown order") || e.contains("Invalid order"))
    {
        Err(Error::UnknownOrder(joined))
    } else if errors
        .iter()
        .any(|e| e.starts_with("EAPI:") || e.contains("Permission denied"))
    {
        Err(Error::Auth(joined))
    } else if errors.iter().any(|e| e.starts_with("EService:")) {
        Err(Error::Unavailable(joined))
    } else {
        Err(Error::Exchange(joined))
    }
}

fn decimal_field(value: &Value, field: &str) -> Result<Decimal> {
    let raw = &value[field];
    let text = match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(Error::Exchange(format!("missing decimal field '{field}'"))),
    };
    Decimal::from_str(&text)
        .map_err(|err| Error::Exchange(format!("bad decimal in field '{field}': {err}")))
}

fn order_from_wire(txid: &str, entry: &Value) -> Result<Order> {
    let descr = &entry["descr"];
    let side = Side::from_str(descr["type"].as_str().unwrap_or_default())?;
    let status = OrderStatus::from_str(entry["status"].as_str().unwrap_or("open"))?;
    Ok(Order {
        txid: txid.to_owned(),
        userref: entry["userref"].as_i64().unwrap_or_default(),
        symbol: descr["pair"].as_str().unwrap_or_default().to_owned(),
        side,
        price: decimal_field(descr, "price")?,
        volume: decimal_field(entry, "vol")?,
        volume_executed: decimal_field(entry, "vol_exec")?,
        status,
        created_at: entry["opentm"].as_f64().unwrap_or_default() as i64,
    })
}

fn pair_info_from_wire(entry: &Value) -> Result<AssetPairInfo> {
    let fees_maker = entry["fees_maker"]
        .as_array()
        .map(|tiers| {
            tiers
                .iter()
                .filter_map(|tier| {
                    let tier = tier.as_array()?;
                    let volume = Decimal::from_str(&tier.first()?.to_string()).ok()?;
                    let percent = Decimal::from_str(&tier.get(1)?.to_string()).ok()?;
                    Some((volume, percent))
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(AssetPairInfo {
        altname: entry["altname"].as_str().unwrap_or_default().to_owned(),
        base: entry["base"].as_str().unwrap_or_default().to_owned(),
        quote: entry["quote"].as_str().unwrap_or_default().to_owned(),
        cost_decimals: entry["cost_decimals"].as_u64().unwrap_or_default() as u32,
        pair_decimals: entry["pair_decimals"].as_u64().unwrap_or_default() as u32,
        lot_decimals: entry["lot_decimals"].as_u64().unwrap_or(8) as u32,
        fees_maker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_sign_matches_known_vector() {
        // Reference vector from the Kraken API documentation.
        let secret = "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==";
        let signature = sign(
            secret,
            "/0/private/AddOrder",
            "1616492376594",
            "nonce=1616492376594&ordertype=limit&pair=XBTUSD&price=37500&type=buy&volume=1.25",
        )
        .unwrap();
        assert_eq!(
            signature,
            "4/dpxb3iT4tp/ZCVEwSnEsLxx0bqyhLpdfOpc6fn7OR8+UClSV5n9E6aSS8MPtnRfp32bAb0nmbRn6H8ndwLUQ=="
        );
    }

    #[test]
    fn test_envelope_classification() {
        let ok = unwrap_envelope(json!({"error": [], "result": {"status": "online"}})).unwrap();
        assert_eq!(ok["status"], "online");

        let err = unwrap_envelope(json!({"error": ["EOrder:Unknown order"]})).unwrap_err();
        assert!(matches!(err, Error::UnknownOrder(_)));

        let err = unwrap_envelope(json!({"error": ["EAPI:Invalid key"]})).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        let err = unwrap_envelope(json!({"error": ["EService:Unavailable"]})).unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));

        let err = unwrap_envelope(json!({"error": ["EOrder:Insufficient funds"]})).unwrap_err();
        assert!(matches!(err, Error::Exchange(_)));
    }

    #[test]
    fn test_order_from_wire() {
        let entry = json!({
            "userref": 123456789,
            "status": "open",
            "opentm": 1_700_000_000.123,
            "vol": "0.00202000",
            "vol_exec": "0.0",
            "descr": {"pair": "BTCUSD", "type": "buy", "price": "49504.9"}
        });
        let order = order_from_wire("TX1", &entry).unwrap();
        assert_eq!(order.txid, "TX1");
        assert_eq!(order.userref, 123456789);
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.price, dec!(49504.9));
        assert_eq!(order.volume, dec!(0.00202000));
        assert_eq!(order.created_at, 1_700_000_000);
    }

    #[test]
    fn test_pair_info_from_wire() {
        let entry = json!({
            "altname": "XBTUSD",
            "base": "XXBT",
            "quote": "ZUSD",
            "cost_decimals": 5,
            "pair_decimals": 1,
            "lot_decimals": 8,
            "fees_maker": [[0, 0.25], [10000, 0.2]]
        });
        let info = pair_info_from_wire(&entry).unwrap();
        assert_eq!(info.altname, "XBTUSD");
        assert_eq!(info.pair_decimals, 1);
        assert_eq!(info.fees_maker[0], (dec!(0), dec!(0.25)));
        assert_eq!(info.top_maker_fee(), Some(dec!(0.0025)));
    }

    #[test]
    fn test_nonce_is_strictly_increasing() {
        let rest = KrakenRest::new("key", "secret");
        let a = rest.nonce();
        let b = rest.nonce();
        let c = rest.nonce();
        assert!(a < b && b < c);
    }
}
