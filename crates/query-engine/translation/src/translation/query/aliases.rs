//! Short, deterministic table aliases.
//!
//! Aliases run `_`, `a` .. `z`, `__`, `a_`, `b_` .. like an odometer whose
//! first digit turns fastest. The first character is always a letter or an
//! underscore so the alias is a valid identifier; later ones may also be
//! `@`, `#` or a digit.

use query_engine_sql::sql::ast::TableAlias;
use query_engine_sql::sql::helpers::make_table_alias;

use super::batch::BatchItem;
use crate::translation::error::Error;

const FIRST_CHARACTERS: &[u8] = b"_abcdefghijklmnopqrstuvwxyz";
const OTHER_CHARACTERS: &[u8] = b"_abcdefghijklmnopqrstuvwxyz@#0123456789";

/// Hands out aliases in sequence. Use a fresh allocator per generated query.
#[derive(Debug, Default)]
pub struct AliasAllocator {
    digits: Vec<usize>,
}

impl AliasAllocator {
    pub fn new() -> AliasAllocator {
        AliasAllocator::default()
    }

    pub fn next_alias(&mut self) -> TableAlias {
        self.increment(0);
        let name: String = self
            .digits
            .iter()
            .enumerate()
            .map(|(position, digit)| {
                let characters = if position == 0 {
                    FIRST_CHARACTERS
                } else {
                    OTHER_CHARACTERS
                };
                char::from(characters[*digit])
            })
            .collect();
        make_table_alias(&name)
    }

    fn increment(&mut self, position: usize) {
        let base = if position == 0 {
            FIRST_CHARACTERS.len()
        } else {
            OTHER_CHARACTERS.len()
        };
        match self.digits.get_mut(position) {
            None => self.digits.push(0),
            Some(digit) => {
                *digit += 1;
                if *digit == base {
                    *digit = 0;
                    self.increment(position + 1);
                }
            }
        }
    }
}

/// Alias every batch depth first, then every join table, and name the
/// output columns after the aliases.
pub fn assign_aliases(batch: &mut BatchItem) -> Result<(), Error> {
    let mut allocator = AliasAllocator::new();
    assign_batch_aliases(&mut allocator, batch)?;
    assign_join_table_aliases(&mut allocator, batch);
    Ok(())
}

fn assign_batch_aliases(
    allocator: &mut AliasAllocator,
    batch: &mut BatchItem,
) -> Result<(), Error> {
    batch.alias = allocator.next_alias();
    for field in &mut batch.fields {
        field.output_alias = format!("{}_{}", batch.alias.name, field.descriptor.property);
    }

    for child in &mut batch.children {
        assign_batch_aliases(allocator, child)?;
    }

    let mut seen: Vec<&str> = vec![];
    for child in &batch.children {
        if let Some(join) = &child.join {
            if seen
                .iter()
                .any(|property| property.eq_ignore_ascii_case(&join.property))
            {
                return Err(Error::DuplicateRelationship(join.property.clone()));
            }
            seen.push(&join.property);
        }
    }
    Ok(())
}

fn assign_join_table_aliases(allocator: &mut AliasAllocator, batch: &mut BatchItem) {
    if let Some(join_table) = batch
        .join
        .as_mut()
        .and_then(|join| join.join_table.as_mut())
    {
        join_table.alias = allocator.next_alias();
    }
    for child in &mut batch.children {
        assign_join_table_aliases(allocator, child);
    }
}
