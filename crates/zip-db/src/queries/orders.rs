use anyhow::Result;

use super::{OptionalExt, enum_column, string_list_column};
use crate::Database;
use crate::migrations::NOW;
use crate::models::{NewOrder, OrderRow, parse_timestamp};

const ORDER_SELECT: &str = "SELECT o.id, o.user_id, o.property_id, p.title, p.city, p.images,
        o.stage, o.tier, o.amount, o.currency, o.created_at, o.paid_at
 FROM verification_orders o
 JOIN properties p ON p.id = o.property_id";

impl Database {
    /// Insert an order. Orders created directly in the paid stage are
    /// stamped with `paid_at` at insert time.
    pub fn create_order(&self, order: &NewOrder<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO verification_orders (id, user_id, property_id, stage, tier, amount, currency, paid_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CASE WHEN ?4 = 'PAID' THEN {NOW} END)"
                ),
                rusqlite::params![
                    order.id,
                    order.user_id,
                    order.property_id,
                    order.stage.as_str(),
                    order.tier.as_str(),
                    order.amount,
                    order.currency,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_order(&self, id: &str) -> Result<Option<OrderRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{ORDER_SELECT} WHERE o.id = ?1"), [id], map_order)
                .optional()
        })
    }

    /// Move a pending order to paid. This is a single conditional write
    /// matched on the current stage, so a repeated call for the same order
    /// changes nothing. Only the stage is rewritten; the tier is untouched.
    /// Returns the number of rows moved (0 or 1).
    pub fn mark_order_paid(&self, id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let moved = conn.execute(
                &format!(
                    "UPDATE verification_orders
                     SET stage = 'PAID', paid_at = {NOW}
                     WHERE id = ?1 AND stage = 'PENDING_PAYMENT'"
                ),
                [id],
            )?;
            Ok(moved)
        })
    }

    /// Paid orders placed by `user_id`, newest first.
    pub fn list_paid_orders(&self, user_id: &str) -> Result<Vec<OrderRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{ORDER_SELECT} WHERE o.user_id = ?1 AND o.stage = 'PAID'
                 ORDER BY o.created_at DESC, o.rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], map_order)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        property_id: row.get(2)?,
        property_title: row.get(3)?,
        property_city: row.get(4)?,
        property_images: string_list_column(row, 5)?,
        stage: enum_column(row, 6)?,
        tier: enum_column(row, 7)?,
        amount: row.get(8)?,
        currency: row.get(9)?,
        created_at: parse_timestamp(&row.get::<_, String>(10)?),
        paid_at: row.get::<_, Option<String>>(11)?.as_deref().map(parse_timestamp),
    })
}
