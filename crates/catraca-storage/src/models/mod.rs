pub mod acesso;
pub mod aluno;
pub mod cartao;

pub use acesso::{Acesso, UnsyncedAcesso};
pub use aluno::Aluno;
pub use cartao::CartaoAcesso;
