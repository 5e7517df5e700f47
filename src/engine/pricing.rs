use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::models::parcel::ParcelKind;

const DOCUMENT_SAME_DISTRICT: Decimal = dec!(60);
const DOCUMENT_CROSS_DISTRICT: Decimal = dec!(80);
const NON_DOCUMENT_SAME_DISTRICT: Decimal = dec!(110);
const NON_DOCUMENT_CROSS_DISTRICT: Decimal = dec!(150);
const FREE_WEIGHT_KG: Decimal = dec!(3);
const PER_EXTRA_KG: Decimal = dec!(40);
const CROSS_DISTRICT_SURCHARGE: Decimal = dec!(40);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CostBreakdown {
    pub base: Decimal,
    pub extra_weight: Decimal,
    pub inter_district: Decimal,
    pub total: Decimal,
}

/// Same-district means the two service center names match after trimming
/// and case folding.
pub fn is_same_district(sender_center: &str, receiver_center: &str) -> bool {
    sender_center.trim().eq_ignore_ascii_case(receiver_center.trim())
}

/// Quote the delivery cost for a parcel. Pure function of its inputs:
/// the same call backs both the client-side preview and the
/// authoritative charge at booking time.
pub fn quote(
    kind: ParcelKind,
    weight_kg: Decimal,
    sender_center: &str,
    receiver_center: &str,
) -> CostBreakdown {
    let same_district = is_same_district(sender_center, receiver_center);

    match kind {
        ParcelKind::Document => {
            // Weight never affects document pricing.
            let base = if same_district {
                DOCUMENT_SAME_DISTRICT
            } else {
                DOCUMENT_CROSS_DISTRICT
            };

            CostBreakdown {
                base,
                extra_weight: Decimal::ZERO,
                inter_district: Decimal::ZERO,
                total: base,
            }
        }
        ParcelKind::NonDocument => {
            let base = if same_district {
                NON_DOCUMENT_SAME_DISTRICT
            } else {
                NON_DOCUMENT_CROSS_DISTRICT
            };

            let over = (weight_kg - FREE_WEIGHT_KG).max(Decimal::ZERO);
            let extra_weight = over * PER_EXTRA_KG;

            // Flat surcharge, not per-kg, and only once the parcel is
            // over the free weight on a cross-district leg.
            let inter_district = if !same_district && over > Decimal::ZERO {
                CROSS_DISTRICT_SURCHARGE
            } else {
                Decimal::ZERO
            };

            CostBreakdown {
                base,
                extra_weight,
                inter_district,
                total: base + extra_weight + inter_district,
            }
        }
    }
}
