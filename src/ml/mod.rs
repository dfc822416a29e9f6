/// Lloyd's-algorithm K-Means trainer shared by both quantizers.
pub mod kmeans;

pub use kmeans::KMeans;
