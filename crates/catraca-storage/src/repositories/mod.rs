pub mod acesso;
pub mod aluno;
pub mod cartao;

pub use acesso::{AcessoRepository, SqliteAcessoRepository};
pub use aluno::{AlunoRepository, SqliteAlunoRepository};
pub use cartao::{CartaoRepository, SqliteCartaoRepository};
