pub mod ast;
pub mod index;
pub mod normalize;
pub mod ngrammer;
pub mod posting_list;

pub use ast::{BooleanExpr, Term};
pub use index::Index;
pub use ngrammer::Ngrammer;
pub use posting_list::PostingList;
