use candle_core::{Device, Tensor};
use super::PromptContent;
use crate::batch::TokenizedBatch;

/// An unbatched prompt tensor is measured by its leading (sequence) dimension.
impl PromptContent for Tensor {
    fn len_estimate(&self) -> usize {
        self.dims().first().copied().unwrap_or(1)
    }
}

impl TokenizedBatch {
    /// Materialize the padded ids and attention mask as `(batch, seq)` candle tensors.
    pub fn to_candle(&self, device: &Device) -> candle_core::Result<(Tensor, Tensor)> {
        let shape = self.shape();
        let input_ids = Tensor::from_vec(self.input_ids().concat(), shape, device)?;
        let attention_mask = Tensor::from_vec(self.attention_mask().concat(), shape, device)?;
        Ok((input_ids, attention_mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use crate::batch::PaddingSide;

    #[test]
    fn test_tensor_len_is_leading_dim() {
        let prompt = Tensor::zeros(&[7, 16], DType::F32, &Device::Cpu).unwrap();
        assert_eq!(prompt.len_estimate(), 7);
    }

    #[test]
    fn test_tokenized_batch_to_candle() {
        let batch = TokenizedBatch::pad(vec![vec![5, 6, 7], vec![8]], 0, None, PaddingSide::Right);
        let (ids, mask) = batch.to_candle(&Device::Cpu).unwrap();

        assert_eq!(ids.dims(), &[2, 3]);
        assert_eq!(ids.to_vec2::<u32>().unwrap(), vec![vec![5, 6, 7], vec![8, 0, 0]]);
        assert_eq!(mask.to_vec2::<u8>().unwrap(), vec![vec![1, 1, 1], vec![1, 0, 0]]);
    }
}
