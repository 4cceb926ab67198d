//! The burn implementation for prompt content.
//! Since burn Tensor are constrained with const generics, we must macro apply
//! the implementation per rank
use burn::tensor::backend::Backend as BurnBackend;
use burn::tensor::{BasicOps, Int, Tensor, TensorData};
use super::PromptContent;
use crate::batch::TokenizedBatch;

macro_rules! impl_prompt_content {
    ($d:literal) => {
        impl <B, K> PromptContent for Tensor<B, $d, K>
        where B: BurnBackend,
        K: BasicOps<B> + 'static {
            fn len_estimate(&self) -> usize {
                self.dims()[0]
            }
        }
    }
}

impl_prompt_content!(1);
impl_prompt_content!(2);
impl_prompt_content!(3);
impl_prompt_content!(4);

impl TokenizedBatch {
    /// Materialize the padded ids and attention mask as `(batch, seq)` int tensors.
    pub fn to_burn<B: BurnBackend>(&self, device: &B::Device) -> (Tensor<B, 2, Int>, Tensor<B, 2, Int>) {
        let (batch, seq) = self.shape();
        let ids: Vec<i64> = self.input_ids().iter().flatten().map(|&id| id as i64).collect();
        let mask: Vec<i64> = self.attention_mask().iter().flatten().map(|&m| m as i64).collect();

        (
            Tensor::from_data(TensorData::new(ids, [batch, seq]), device),
            Tensor::from_data(TensorData::new(mask, [batch, seq]), device),
        )
    }
}
