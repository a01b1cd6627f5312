// Semantic reduction of the significant foods.
//
// Names are normalized to short token sequences, embedded, and grouped with
// k-means; each group is then labelled from its member names. Embedding,
// clustering, and keyword extraction sit behind traits so the pipeline never
// depends on a concrete model.

pub mod embeddings;
pub mod kmeans;
pub mod labels;
pub mod normalize;
