use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Card details as sealed into a link. Serialized to JSON before encryption,
/// with the same field names the web client uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    pub cardholder_name: String,
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
}

impl CardData {
    /// Card number with all but the last four digits masked.
    pub fn masked_number(&self) -> String {
        let digits: Vec<char> = self
            .card_number
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let visible = digits.len().saturating_sub(4);
        digits
            .iter()
            .enumerate()
            .map(|(i, &c)| if i < visible { '•' } else { c })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> CardData {
        CardData {
            cardholder_name: "Ada Lovelace".into(),
            card_number: "4242 4242 4242 4242".into(),
            expiry_date: "12/29".into(),
            cvv: "123".into(),
        }
    }

    #[test]
    fn json_field_names() {
        let json = serde_json::to_value(card()).unwrap();
        assert_eq!(json["cardholderName"], "Ada Lovelace");
        assert_eq!(json["cardNumber"], "4242 4242 4242 4242");
        assert_eq!(json["expiryDate"], "12/29");
        assert_eq!(json["cvv"], "123");
    }

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(card().masked_number(), "••••••••••••4242");
    }
}
