//! Total counts for paging through a list.

use query_engine_sql::sql::ast::{CountType, Expression, Select, SelectList, Where};
use query_engine_sql::sql::helpers::{
    conjunction, empty_limit, empty_order_by, make_column_alias, simple_select, table_from,
};

use super::aggregation;
use super::batch::BatchItem;
use super::filtering::row_predicates;

/// The single column of a count query.
pub const COUNT_COLUMN: &str = "count";

/// Count the rows a batch would produce without its window. Grouped batches
/// count their groups.
pub fn build_count(batch: &BatchItem) -> Select {
    let select_list = vec![(
        make_column_alias(COUNT_COLUMN.to_string()),
        Expression::Count(CountType::Star),
    )];

    if batch.has_aggregation() {
        let mut select = aggregation::build_select(batch);
        select.select_list = SelectList::SelectList(select_list);
        select.order_by = empty_order_by();
        select.limit = empty_limit();
        select
    } else {
        let mut select = simple_select(select_list);
        select.from = Some(table_from(&batch.entity.table, &batch.alias));
        select.where_ = Where(conjunction(row_predicates(batch)));
        select
    }
}
