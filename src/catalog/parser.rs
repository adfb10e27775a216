use chumsky::{input::Emitter, prelude::*};

use super::error::{CatalogError, CatalogResult};
use crate::record::{TdItem, TupleDesc, Type};

/// One table parsed from a schema description line
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub desc: TupleDesc,
    pub primary_key: Option<String>,
}

/// A run of characters that are not whitespace or punctuation
fn word<'a>() -> impl Parser<'a, &'a str, &'a str, extra::Err<Rich<'a, char>>> {
    any()
        .filter(|c: &char| !c.is_whitespace() && !matches!(c, '(' | ')' | ','))
        .repeated()
        .at_least(1)
        .to_slice()
        .padded()
}

/// `field type [pk]`
fn column<'a>() -> impl Parser<'a, &'a str, (TdItem, bool), extra::Err<Rich<'a, char>>> {
    word().then(word()).then(word().or_not()).validate(
        |((name, ty), annotation): ((&str, &str), Option<&str>),
         map,
         emitter: &mut Emitter<Rich<char>>| {
            let field_type = match ty.to_ascii_lowercase().as_str() {
                "int" => Type::Int,
                "string" => Type::string(),
                _ => {
                    emitter.emit(Rich::custom(map.span(), format!("unknown type '{}'", ty)));
                    Type::Int
                }
            };

            let is_pk = match annotation {
                None => false,
                Some("pk") => true,
                Some(other) => {
                    emitter.emit(Rich::custom(
                        map.span(),
                        format!("unknown annotation '{}'", other),
                    ));
                    false
                }
            };

            (TdItem::new(name, field_type), is_pk)
        },
    )
}

/// `name (column, column, ...)`
fn table_def<'a>() -> impl Parser<'a, &'a str, TableDef, extra::Err<Rich<'a, char>>> {
    let name = none_of("(")
        .repeated()
        .to_slice()
        .map(|s: &str| s.trim().to_string());

    let columns = column()
        .separated_by(just(','))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just('('), just(')'))
        .padded();

    name.then(columns).then_ignore(end()).validate(
        |(name, columns): (String, Vec<(TdItem, bool)>),
         map,
         emitter: &mut Emitter<Rich<char>>| {
            if name.is_empty() {
                emitter.emit(Rich::custom(map.span(), "missing table name"));
            }

            let mut primary_key = None;
            let mut items = Vec::with_capacity(columns.len());
            for (item, is_pk) in columns {
                if is_pk {
                    if primary_key.is_some() {
                        emitter.emit(Rich::custom(map.span(), "more than one pk column"));
                    }
                    primary_key = Some(item.name.clone());
                }
                items.push(item);
            }

            TableDef {
                name,
                desc: TupleDesc::new(items),
                primary_key,
            }
        },
    )
}

/// Parse a whole schema description, one table per line.
/// Blank lines are skipped; the first malformed line fails the whole parse.
pub fn parse_schema(source: &str) -> CatalogResult<Vec<TableDef>> {
    let mut defs = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let def = table_def().parse(line).into_result().map_err(|errs| {
            CatalogError::Parse {
                line: idx + 1,
                message: errs
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            }
        })?;
        defs.push(def);
    }

    Ok(defs)
}
